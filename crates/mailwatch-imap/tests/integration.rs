//! Client sessions against a scripted in-memory server.

use std::time::Duration;

use chrono::NaiveDate;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;

use mailwatch_imap::{Client, Error, FetchSection, SearchQuery};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Sends `greeting`, then answers each command line with the next reply.
/// Hangs up once the replies run out and yields the commands it received.
fn scripted_server(greeting: &str, replies: Vec<String>) -> (DuplexStream, JoinHandle<Vec<String>>) {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let greeting = greeting.to_string();

    let server = tokio::spawn(async move {
        let mut io = BufReader::new(server_end);
        let mut received = Vec::new();
        if io.write_all(greeting.as_bytes()).await.is_err() {
            return received;
        }
        for reply in replies {
            let mut line = String::new();
            match io.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => received.push(line.trim_end().to_string()),
            }
            if io.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
        received
    });

    (client_end, server)
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn test_full_poll_session() {
    let header = "From: Billing <billing@example.com>\r\nSubject: Invoice\r\n\r\n";
    let replies = vec![
        "A0000 OK LOGIN completed\r\n".to_string(),
        "* FLAGS (\\Seen \\Answered)\r\n* 12 EXISTS\r\n* 0 RECENT\r\n\
         A0001 OK [READ-WRITE] SELECT completed\r\n"
            .to_string(),
        "* SEARCH 7 3 9\r\nA0002 OK SEARCH completed\r\n".to_string(),
        format!(
            "* 5 FETCH (UID 9 BODY[HEADER] {{{}}}\r\n{header})\r\nA0003 OK FETCH completed\r\n",
            header.len()
        ),
        "* BYE logging out\r\nA0004 OK LOGOUT completed\r\n".to_string(),
    ];
    let (stream, server) = scripted_server("* OK [CAPABILITY IMAP4rev1] ready\r\n", replies);
    let mut client = Client::from_stream(stream, TIMEOUT).await.unwrap();

    client.login("me@example.com", "app password").await.unwrap();
    assert_eq!(client.select("INBOX").await.unwrap(), 12);
    assert_eq!(client.selected(), Some("INBOX"));

    let query = SearchQuery::since(day(2025, 10, 13))
        .before(day(2025, 10, 15))
        .from_any(["billing@example.com"]);
    assert_eq!(client.uid_search(&query).await.unwrap(), vec![3, 7, 9]);

    let fetched = client.uid_fetch(9, FetchSection::Header).await.unwrap();
    assert_eq!(fetched.as_deref(), Some(header.as_bytes()));

    client.logout().await.unwrap();

    assert_eq!(
        server.await.unwrap(),
        vec![
            "A0000 LOGIN me@example.com \"app password\"",
            "A0001 SELECT INBOX",
            "A0002 UID SEARCH SINCE 13-Oct-2025 BEFORE 15-Oct-2025 FROM billing@example.com",
            "A0003 UID FETCH 9 (UID BODY.PEEK[HEADER])",
            "A0004 LOGOUT",
        ]
    );
}

#[tokio::test]
async fn test_fetch_of_expunged_message_is_none() {
    let replies = vec![
        "A0000 OK [READ-WRITE] SELECT completed\r\n".to_string(),
        "* 2 FETCH (FLAGS (\\Seen))\r\nA0001 OK FETCH completed\r\n".to_string(),
    ];
    let (stream, _server) = scripted_server("* OK ready\r\n", replies);
    let mut client = Client::from_stream(stream, TIMEOUT).await.unwrap();

    client.select("INBOX").await.unwrap();
    assert_eq!(client.uid_fetch(4, FetchSection::Full).await.unwrap(), None);
}

#[tokio::test]
async fn test_search_rejected_by_server() {
    let replies = vec![
        "A0000 OK SELECT completed\r\n".to_string(),
        "A0001 BAD Could not parse command\r\n".to_string(),
    ];
    let (stream, _server) = scripted_server("* OK ready\r\n", replies);
    let mut client = Client::from_stream(stream, TIMEOUT).await.unwrap();

    client.select("INBOX").await.unwrap();
    let err = client
        .uid_search(&SearchQuery::since(day(2025, 1, 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Bad(_)));
    assert!(!err.is_session_fatal());
}

#[tokio::test]
async fn test_connection_dropped_mid_command() {
    let (stream, _server) = scripted_server("* OK ready\r\n", vec!["* 3 EXISTS\r\n".to_string()]);
    let mut client = Client::from_stream(stream, TIMEOUT).await.unwrap();

    let err = client.select("INBOX").await.unwrap_err();
    assert!(err.is_session_fatal());
}

#[tokio::test]
async fn test_logout_after_server_hangup() {
    let (stream, server) = scripted_server("* OK ready\r\n", vec![String::new()]);
    let client = Client::from_stream(stream, TIMEOUT).await.unwrap();

    client.logout().await.unwrap();
    assert_eq!(server.await.unwrap(), vec!["A0000 LOGOUT"]);
}

#[tokio::test]
async fn test_greeting_bye_refuses_session() {
    let (stream, _server) = scripted_server("* BYE too many connections\r\n", Vec::new());
    let err = Client::from_stream(stream, TIMEOUT).await.unwrap_err();
    assert!(matches!(err, Error::Bye(_)));
}
