//! Parameter normalization.
//!
//! Callers (often automated agents) send numbers as integers, floats,
//! strings, or garbage. Everything is coerced into a typed [`PollConfig`]
//! here; nothing in this module fails or panics. Values that cannot be
//! interpreted fall back to the field's default and values outside the
//! valid range are clamped, each with a [`Diagnostic`] logged at `warn`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// A bounded integer parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntField {
    /// Argument name.
    pub name: &'static str,
    /// Value used when the input is missing or unusable.
    pub default: i64,
    /// Inclusive lower bound.
    pub min: i64,
    /// Inclusive upper bound.
    pub max: i64,
}

impl IntField {
    /// Returns the same field with a different default, clamped into range.
    #[must_use]
    pub const fn with_default(self, default: i64) -> Self {
        Self {
            default: self.clamp(default),
            ..self
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    const fn clamp_u32(&self, value: u32) -> u32 {
        // Every range lies within 1..=3600.
        self.clamp(value as i64) as u32
    }

    const fn clamp(&self, value: i64) -> i64 {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }
}

/// Maximum number of messages examined per cycle.
pub const MAX_MESSAGES: IntField = IntField {
    name: "max_messages",
    default: 100,
    min: 1,
    max: 1000,
};

/// Seconds between monitor cycles.
pub const CHECK_INTERVAL_SECONDS: IntField = IntField {
    name: "check_interval_seconds",
    default: 1800,
    min: 1,
    max: 3600,
};

/// Search window in hours; overrides [`DAYS_BACK`] when supplied.
pub const TIME_WINDOW_HOURS: IntField = IntField {
    name: "time_window_hours",
    default: 24,
    min: 1,
    max: 720,
};

/// Search window in days.
pub const DAYS_BACK: IntField = IntField {
    name: "days_back",
    default: 1,
    min: 1,
    max: 30,
};

/// What was wrong with an input value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Not a number (or boolean) at all; the default was used.
    Unparseable,
    /// Infinity or NaN; the default was used.
    NonFinite,
    /// Parsed, but outside the valid range.
    Clamped {
        /// The value before clamping.
        from: i64,
    },
}

/// A non-fatal note about one coerced field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostic {
    /// Argument name.
    pub field: &'static str,
    /// What happened.
    pub kind: DiagnosticKind,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DiagnosticKind::Unparseable => {
                write!(f, "{}: value not understood, using default", self.field)
            }
            DiagnosticKind::NonFinite => {
                write!(f, "{}: non-finite value, using default", self.field)
            }
            DiagnosticKind::Clamped { from } => {
                write!(f, "{}: {from} out of range, clamped", self.field)
            }
        }
    }
}

/// A coerced value plus the diagnostic, if any, raised while producing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coerced<T> {
    /// The usable value.
    pub value: T,
    /// Why the value differs from the input, if it does.
    pub diagnostic: Option<Diagnostic>,
}

impl<T> Coerced<T> {
    const fn clean(value: T) -> Self {
        Self {
            value,
            diagnostic: None,
        }
    }

    fn noted(value: T, field: &'static str, kind: DiagnosticKind) -> Self {
        let diagnostic = Diagnostic { field, kind };
        warn!(field, kind = ?kind, "{diagnostic}");
        Self {
            value,
            diagnostic: Some(diagnostic),
        }
    }
}

enum Parsed {
    Int(i64),
    Missing,
    Invalid(DiagnosticKind),
}

#[allow(clippy::cast_possible_truncation)]
fn truncate(value: f64) -> Parsed {
    if value.is_finite() {
        // `as` saturates at the i64 bounds, which clamping then handles.
        Parsed::Int(value.trunc() as i64)
    } else {
        Parsed::Invalid(DiagnosticKind::NonFinite)
    }
}

fn parse_int(value: Option<&Value>) -> Parsed {
    match value {
        None | Some(Value::Null) => Parsed::Missing,
        Some(Value::Bool(b)) => Parsed::Int(i64::from(*b)),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Parsed::Int(i)
            } else if n.is_u64() {
                Parsed::Int(i64::MAX)
            } else {
                n.as_f64()
                    .map_or(Parsed::Invalid(DiagnosticKind::Unparseable), truncate)
            }
        }
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Parsed::Invalid(DiagnosticKind::Unparseable);
            }
            if let Ok(i) = s.parse::<i64>() {
                return Parsed::Int(i);
            }
            s.parse::<f64>()
                .map_or(Parsed::Invalid(DiagnosticKind::Unparseable), truncate)
        }
        Some(Value::Array(_) | Value::Object(_)) => Parsed::Invalid(DiagnosticKind::Unparseable),
    }
}

/// Coerces any JSON value into an integer within the field's range.
///
/// Integers pass through, finite floats and numeric strings (including
/// scientific notation) are truncated toward zero, booleans become 0 or 1.
/// Missing and `null` inputs yield the default silently.
#[must_use]
pub fn coerce_int(value: Option<&Value>, field: &IntField) -> Coerced<i64> {
    match parse_int(value) {
        Parsed::Missing => Coerced::clean(field.default),
        Parsed::Invalid(kind) => Coerced::noted(field.default, field.name, kind),
        Parsed::Int(raw) => {
            let clamped = field.clamp(raw);
            if clamped == raw {
                Coerced::clean(raw)
            } else {
                Coerced::noted(clamped, field.name, DiagnosticKind::Clamped { from: raw })
            }
        }
    }
}

/// Coerces any JSON value into a boolean.
///
/// Accepts booleans, the numbers 0 and 1, and the strings
/// `true/false/1/0/yes/no/on/off` in any case.
#[must_use]
pub fn coerce_bool(value: Option<&Value>, name: &'static str, default: bool) -> Coerced<bool> {
    let parsed = match value {
        None | Some(Value::Null) => return Coerced::clean(default),
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v == 0.0 => Some(false),
            Some(v) if v == 1.0 => Some(true),
            _ => None,
        },
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        Some(Value::Array(_) | Value::Object(_)) => None,
    };

    parsed.map_or_else(
        || Coerced::noted(default, name, DiagnosticKind::Unparseable),
        Coerced::clean,
    )
}

/// Effective polling configuration for one cycle or one monitor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Maximum number of messages examined per cycle.
    pub max_messages: u32,
    /// Seconds between monitor cycles.
    pub check_interval_seconds: u32,
    /// Window in hours; takes precedence over `days_back` when set.
    pub time_window_hours: Option<u32>,
    /// Window in days.
    pub days_back: u32,
    /// Whether already-seen messages are skipped.
    pub use_cache: bool,
}

impl Default for PollConfig {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn default() -> Self {
        Self {
            max_messages: MAX_MESSAGES.default as u32,
            check_interval_seconds: CHECK_INTERVAL_SECONDS.default as u32,
            time_window_hours: None,
            days_back: DAYS_BACK.default as u32,
            use_cache: true,
        }
    }
}

impl PollConfig {
    /// Hours covered by the search window.
    #[must_use]
    pub const fn effective_hours(&self) -> u32 {
        match self.time_window_hours {
            Some(hours) => hours,
            None => self.days_back.saturating_mul(24),
        }
    }

    /// Human-readable window, e.g. `"6 hours"` or `"2 days"`.
    #[must_use]
    pub fn search_period(&self) -> String {
        match self.time_window_hours {
            Some(hours) => format!("{hours} hours"),
            None => format!("{} days", self.days_back),
        }
    }

    /// The same configuration with every field inside its range.
    ///
    /// Configured defaults go through this before any request sees them.
    #[must_use]
    pub fn clamped(self) -> Self {
        let clamped = Self {
            max_messages: MAX_MESSAGES.clamp_u32(self.max_messages),
            check_interval_seconds: CHECK_INTERVAL_SECONDS.clamp_u32(self.check_interval_seconds),
            time_window_hours: self
                .time_window_hours
                .map(|hours| TIME_WINDOW_HOURS.clamp_u32(hours)),
            days_back: DAYS_BACK.clamp_u32(self.days_back),
            use_cache: self.use_cache,
        };
        if clamped != self {
            warn!(configured = ?self, using = ?clamped, "configured defaults out of range, clamped");
        }
        clamped
    }

    /// Interval between monitor cycles.
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.check_interval_seconds))
    }
}

/// Normalized request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollParams {
    /// Poll configuration.
    pub config: PollConfig,
    /// Whether the caller asked for background monitoring.
    pub background_mode: bool,
    /// Every coercion note raised while normalizing.
    pub diagnostics: Vec<Diagnostic>,
}

impl PollParams {
    /// Normalizes arguments against the built-in defaults.
    #[must_use]
    pub fn from_value(args: &Value) -> Self {
        Self::from_value_with(args, &PollConfig::default())
    }

    /// Normalizes arguments, filling missing fields from `defaults`.
    ///
    /// `time_range_hours` is accepted as an alias of `time_window_hours`.
    /// A window supplied in an unusable form still overrides `days_back`,
    /// falling back to 24 hours.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_value_with(args: &Value, defaults: &PollConfig) -> Self {
        let mut diagnostics = Vec::new();
        let mut take = |coerced: Coerced<i64>| {
            diagnostics.extend(coerced.diagnostic);
            // Every field's range lies within 1..=3600.
            coerced.value as u32
        };

        let max_messages = take(coerce_int(
            args.get("max_messages"),
            &MAX_MESSAGES.with_default(i64::from(defaults.max_messages)),
        ));
        let check_interval_seconds = take(coerce_int(
            args.get("check_interval_seconds"),
            &CHECK_INTERVAL_SECONDS.with_default(i64::from(defaults.check_interval_seconds)),
        ));
        let days_back = take(coerce_int(
            args.get("days_back"),
            &DAYS_BACK.with_default(i64::from(defaults.days_back)),
        ));

        let window_arg = args
            .get("time_window_hours")
            .filter(|v| !v.is_null())
            .or_else(|| args.get("time_range_hours").filter(|v| !v.is_null()));
        let time_window_hours = match window_arg {
            Some(value) => Some(take(coerce_int(Some(value), &TIME_WINDOW_HOURS))),
            None => defaults
                .time_window_hours
                .map(|hours| TIME_WINDOW_HOURS.clamp_u32(hours)),
        };

        let use_cache = coerce_bool(args.get("use_cache"), "use_cache", defaults.use_cache);
        let background_mode = coerce_bool(args.get("background_mode"), "background_mode", false);
        diagnostics.extend(use_cache.diagnostic);
        diagnostics.extend(background_mode.diagnostic);

        Self {
            config: PollConfig {
                max_messages,
                check_interval_seconds,
                time_window_hours,
                days_back,
                use_cache: use_cache.value,
            },
            background_mode: background_mode.value,
            diagnostics,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn int(value: Value, field: &IntField) -> Coerced<i64> {
        coerce_int(Some(&value), field)
    }

    #[test]
    fn test_integer_passthrough() {
        let c = int(json!(50), &MAX_MESSAGES);
        assert_eq!(c.value, 50);
        assert!(c.diagnostic.is_none());
    }

    #[test]
    fn test_float_truncates() {
        assert_eq!(int(json!(10.5), &MAX_MESSAGES).value, 10);
        assert_eq!(int(json!(10.0), &MAX_MESSAGES).value, 10);
    }

    #[test]
    fn test_numeric_strings() {
        assert_eq!(int(json!("20.7"), &MAX_MESSAGES).value, 20);
        assert_eq!(int(json!("1e2"), &MAX_MESSAGES).value, 100);
        assert_eq!(int(json!("  42 "), &MAX_MESSAGES).value, 42);
        assert_eq!(int(json!("0010"), &MAX_MESSAGES).value, 10);
    }

    #[test]
    fn test_booleans_as_numbers() {
        assert_eq!(int(json!(true), &DAYS_BACK).value, 1);
        let zero = int(json!(false), &DAYS_BACK);
        assert_eq!(zero.value, 1);
        assert_eq!(
            zero.diagnostic.unwrap().kind,
            DiagnosticKind::Clamped { from: 0 }
        );
    }

    #[test]
    fn test_non_finite_strings_fall_back() {
        for input in ["inf", "-Infinity", "nan", "NaN"] {
            let c = int(json!(input), &MAX_MESSAGES);
            assert_eq!(c.value, 100, "{input}");
            assert_eq!(c.diagnostic.unwrap().kind, DiagnosticKind::NonFinite);
        }
    }

    #[test]
    fn test_garbage_falls_back() {
        for input in [json!("abc"), json!(""), json!("   "), json!([1]), json!({"a": 1})] {
            let c = int(input.clone(), &MAX_MESSAGES);
            assert_eq!(c.value, 100, "{input}");
            assert_eq!(c.diagnostic.unwrap().kind, DiagnosticKind::Unparseable);
        }
    }

    #[test]
    fn test_null_and_missing_are_silent() {
        assert_eq!(coerce_int(None, &MAX_MESSAGES), Coerced::clean(100));
        assert_eq!(int(Value::Null, &MAX_MESSAGES), Coerced::clean(100));
    }

    #[test]
    fn test_out_of_range_clamps() {
        let high = int(json!(5000), &MAX_MESSAGES);
        assert_eq!(high.value, 1000);
        assert_eq!(
            high.diagnostic.unwrap().kind,
            DiagnosticKind::Clamped { from: 5000 }
        );
        assert_eq!(int(json!(-3), &CHECK_INTERVAL_SECONDS).value, 1);
        assert_eq!(int(json!(u64::MAX), &TIME_WINDOW_HOURS).value, 720);
        assert_eq!(int(json!(1e300), &TIME_WINDOW_HOURS).value, 720);
    }

    #[test]
    fn test_coerce_bool() {
        assert!(coerce_bool(Some(&json!("YES")), "b", false).value);
        assert!(!coerce_bool(Some(&json!(" off ")), "b", true).value);
        assert!(coerce_bool(Some(&json!(1)), "b", false).value);
        assert!(coerce_bool(None, "b", true).value);

        let odd = coerce_bool(Some(&json!("maybe")), "b", true);
        assert!(odd.value);
        assert!(odd.diagnostic.is_some());
        assert!(coerce_bool(Some(&json!(2)), "b", false).diagnostic.is_some());
    }

    #[test]
    fn test_window_overrides_days_back() {
        let params = PollParams::from_value(&json!({"time_window_hours": 6, "days_back": 3}));
        assert_eq!(params.config.effective_hours(), 6);
        assert_eq!(params.config.search_period(), "6 hours");

        let days = PollParams::from_value(&json!({"days_back": 3}));
        assert_eq!(days.config.time_window_hours, None);
        assert_eq!(days.config.effective_hours(), 72);
        assert_eq!(days.config.search_period(), "3 days");
    }

    #[test]
    fn test_time_range_alias() {
        let params = PollParams::from_value(&json!({"time_range_hours": "12"}));
        assert_eq!(params.config.time_window_hours, Some(12));
    }

    #[test]
    fn test_malformed_window_still_overrides() {
        let params = PollParams::from_value(&json!({"time_window_hours": "soon", "days_back": 5}));
        assert_eq!(params.config.time_window_hours, Some(24));
        assert_eq!(params.diagnostics.len(), 1);
    }

    #[test]
    fn test_defaults_from_configuration() {
        let defaults = PollConfig {
            max_messages: 20,
            time_window_hours: Some(2),
            use_cache: false,
            ..PollConfig::default()
        };
        let params = PollParams::from_value_with(&json!({}), &defaults);
        assert_eq!(params.config, defaults);
        assert!(!params.background_mode);
        assert!(params.diagnostics.is_empty());
    }

    #[test]
    fn test_out_of_range_defaults_are_clamped() {
        let defaults = PollConfig {
            max_messages: 0,
            check_interval_seconds: 0,
            time_window_hours: Some(0),
            days_back: u32::MAX,
            use_cache: true,
        };
        let params = PollParams::from_value_with(&json!({}), &defaults);
        assert_eq!(params.config.max_messages, 1);
        assert_eq!(params.config.check_interval_seconds, 1);
        assert_eq!(params.config.time_window_hours, Some(1));
        assert_eq!(params.config.days_back, 30);

        let clamped = defaults.clamped();
        assert_eq!(clamped, params.config);
        assert_eq!(clamped.clamped(), clamped);
    }

    #[test]
    fn test_effective_hours_saturates() {
        let config = PollConfig {
            days_back: u32::MAX,
            ..PollConfig::default()
        };
        assert_eq!(config.effective_hours(), u32::MAX);
    }

    #[test]
    fn test_non_object_arguments() {
        let params = PollParams::from_value(&json!("nonsense"));
        assert_eq!(params.config, PollConfig::default());
    }

    proptest::proptest! {
        #[test]
        fn prop_any_string_lands_in_range(input in "\\PC*") {
            let c = coerce_int(Some(&Value::String(input)), &MAX_MESSAGES);
            proptest::prop_assert!((1..=1000).contains(&c.value));
        }

        #[test]
        fn prop_any_float_lands_in_range(input in proptest::num::f64::ANY) {
            let value = serde_json::Number::from_f64(input).map_or(Value::Null, Value::Number);
            let c = coerce_int(Some(&value), &TIME_WINDOW_HOURS);
            proptest::prop_assert!((1..=720).contains(&c.value));
        }

        #[test]
        fn prop_any_integer_lands_in_range(input in proptest::num::i64::ANY) {
            let c = coerce_int(Some(&Value::from(input)), &DAYS_BACK);
            proptest::prop_assert!((1..=30).contains(&c.value));
        }
    }
}
