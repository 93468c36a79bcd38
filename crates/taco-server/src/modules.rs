//! Standard modules exposed by the Rust Taco server.
//!
//! Remote callers import these by name: `time` (sleep and wall-clock),
//! `datetime` (chrono-backed date/time classes), and `sys` (server
//! facts). Together with the built-in functions they form the default
//! surface of the `taco-rust` executable.

use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt::Write as _;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use taco_core::{
    CallArgs, Module, ModuleRegistry, NativeClass, Result, ServerObject, ServerValue, TacoError,
};

/// Registry of everything the server exposes.
pub fn registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register(time_module());
    registry.register(datetime_module());
    registry.register(sys_module());
    registry
}

fn time_module() -> Module {
    Module::new("time")
        .function("time", |_args| {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|e| TacoError::Other(format!("system clock before epoch: {e}")))?;
            Ok(now.as_secs_f64().into())
        })
        .function("sleep", |args: CallArgs| {
            let seconds = args.float(0)?;
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(TacoError::InvalidArguments(
                    "sleep duration must be a non-negative number".to_string(),
                ));
            }
            // The dispatch loop is single-request, so blocking here is the
            // intended semantics.
            std::thread::sleep(Duration::from_secs_f64(seconds));
            Ok(ServerValue::Null)
        })
}

fn sys_module() -> Module {
    Module::new("sys")
        .value("version", env!("CARGO_PKG_VERSION"))
        .value("platform", std::env::consts::OS)
}

fn datetime_module() -> Module {
    Module::new("datetime")
        .class(
            NativeClass::new("datetime", |args: CallArgs| {
                let value = make_datetime(
                    args.int(0)?,
                    args.int(1)?,
                    args.int(2)?,
                    opt_int(&args, 3, 0)?,
                    opt_int(&args, 4, 0)?,
                    opt_int(&args, 5, 0)?,
                )?;
                Ok(Box::new(DateTime { value }))
            })
            .class_method("strptime", |args: CallArgs| {
                let (text, fmt) = (args.str(0)?, args.str(1)?);
                let value = NaiveDateTime::parse_from_str(text, fmt).map_err(|e| {
                    TacoError::InvalidArguments(format!(
                        "cannot parse \"{text}\" with \"{fmt}\": {e}"
                    ))
                })?;
                Ok(ServerValue::object(DateTime { value }))
            })
            .class_method("combine", |args: CallArgs| {
                let date = expect_date(args.require(0)?)?;
                let time = expect_time(args.require(1)?)?;
                Ok(ServerValue::object(DateTime {
                    value: date.and_time(time),
                }))
            }),
        )
        .class(NativeClass::new("date", |args: CallArgs| {
            let value = make_date(args.int(0)?, args.int(1)?, args.int(2)?)?;
            Ok(Box::new(Date { value }))
        }))
        .class(NativeClass::new("time", |args: CallArgs| {
            let value = make_time(args.int(0)?, args.int(1)?, opt_int(&args, 2, 0)?)?;
            Ok(Box::new(Time { value }))
        }))
}

struct DateTime {
    value: NaiveDateTime,
}

struct Date {
    value: NaiveDate,
}

struct Time {
    value: NaiveTime,
}

impl ServerObject for DateTime {
    fn class_name(&self) -> &str {
        "datetime"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn call_method(&mut self, name: &str, args: CallArgs) -> Result<ServerValue> {
        match name {
            "strftime" => Ok(strftime(&self.value, args.str(0)?)?.into()),
            "date" => Ok(ServerValue::object(Date {
                value: self.value.date(),
            })),
            "time" => Ok(ServerValue::object(Time {
                value: self.value.time(),
            })),
            "replace" => {
                let value = make_datetime(
                    kwarg_int(&args, "year", i64::from(self.value.year()))?,
                    kwarg_int(&args, "month", i64::from(self.value.month()))?,
                    kwarg_int(&args, "day", i64::from(self.value.day()))?,
                    kwarg_int(&args, "hour", i64::from(self.value.hour()))?,
                    kwarg_int(&args, "minute", i64::from(self.value.minute()))?,
                    kwarg_int(&args, "second", i64::from(self.value.second()))?,
                )?;
                Ok(ServerValue::object(DateTime { value }))
            }
            _ => Err(TacoError::NoSuchAttribute {
                target: "datetime".to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn get_attribute(&self, name: &str) -> Result<ServerValue> {
        match name {
            "year" => Ok(i64::from(self.value.year()).into()),
            "month" => Ok(i64::from(self.value.month()).into()),
            "day" => Ok(i64::from(self.value.day()).into()),
            "hour" => Ok(i64::from(self.value.hour()).into()),
            "minute" => Ok(i64::from(self.value.minute()).into()),
            "second" => Ok(i64::from(self.value.second()).into()),
            _ => Err(TacoError::NoSuchAttribute {
                target: "datetime".to_string(),
                name: name.to_string(),
            }),
        }
    }
}

impl ServerObject for Date {
    fn class_name(&self) -> &str {
        "date"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn call_method(&mut self, name: &str, args: CallArgs) -> Result<ServerValue> {
        match name {
            "strftime" => Ok(strftime(&DelayedDate(self.value), args.str(0)?)?.into()),
            _ => Err(TacoError::NoSuchAttribute {
                target: "date".to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn get_attribute(&self, name: &str) -> Result<ServerValue> {
        match name {
            "year" => Ok(i64::from(self.value.year()).into()),
            "month" => Ok(i64::from(self.value.month()).into()),
            "day" => Ok(i64::from(self.value.day()).into()),
            _ => Err(TacoError::NoSuchAttribute {
                target: "date".to_string(),
                name: name.to_string(),
            }),
        }
    }
}

impl ServerObject for Time {
    fn class_name(&self) -> &str {
        "time"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn call_method(&mut self, name: &str, args: CallArgs) -> Result<ServerValue> {
        match name {
            "strftime" => Ok(strftime(&DelayedTime(self.value), args.str(0)?)?.into()),
            _ => Err(TacoError::NoSuchAttribute {
                target: "time".to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn get_attribute(&self, name: &str) -> Result<ServerValue> {
        match name {
            "hour" => Ok(i64::from(self.value.hour()).into()),
            "minute" => Ok(i64::from(self.value.minute()).into()),
            "second" => Ok(i64::from(self.value.second()).into()),
            _ => Err(TacoError::NoSuchAttribute {
                target: "time".to_string(),
                name: name.to_string(),
            }),
        }
    }
}

fn opt_int(args: &CallArgs, index: usize, default: i64) -> Result<i64> {
    match args.get(index) {
        Some(v) => v.as_i64().ok_or_else(|| {
            TacoError::InvalidArguments(format!("argument {} must be an integer", index + 1))
        }),
        None => Ok(default),
    }
}

fn kwarg_int(args: &CallArgs, name: &str, default: i64) -> Result<i64> {
    match args.kwarg(name) {
        Some(v) => v.as_i64().ok_or_else(|| {
            TacoError::InvalidArguments(format!("\"{name}\" must be an integer"))
        }),
        None => Ok(default),
    }
}

fn make_date(year: i64, month: i64, day: i64) -> Result<NaiveDate> {
    let out_of_range = || {
        TacoError::InvalidArguments(format!("invalid date {year}-{month}-{day}"))
    };
    NaiveDate::from_ymd_opt(
        i32::try_from(year).map_err(|_| out_of_range())?,
        u32::try_from(month).map_err(|_| out_of_range())?,
        u32::try_from(day).map_err(|_| out_of_range())?,
    )
    .ok_or_else(out_of_range)
}

fn make_time(hour: i64, minute: i64, second: i64) -> Result<NaiveTime> {
    let out_of_range = || {
        TacoError::InvalidArguments(format!("invalid time {hour}:{minute}:{second}"))
    };
    NaiveTime::from_hms_opt(
        u32::try_from(hour).map_err(|_| out_of_range())?,
        u32::try_from(minute).map_err(|_| out_of_range())?,
        u32::try_from(second).map_err(|_| out_of_range())?,
    )
    .ok_or_else(out_of_range)
}

fn make_datetime(
    year: i64,
    month: i64,
    day: i64,
    hour: i64,
    minute: i64,
    second: i64,
) -> Result<NaiveDateTime> {
    Ok(make_date(year, month, day)?.and_time(make_time(hour, minute, second)?))
}

/// Format with a strftime pattern, validated up front so bad patterns come
/// back as argument errors instead of output failures.
fn strftime(value: &dyn Strftime, fmt: &str) -> Result<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(fmt).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(TacoError::InvalidArguments(format!(
            "invalid strftime format \"{fmt}\""
        )));
    }
    let mut out = String::new();
    value.render(&items, &mut out).map_err(|_| {
        TacoError::InvalidArguments(format!("cannot format this value with \"{fmt}\""))
    })?;
    Ok(out)
}

/// Object-safe shim over chrono's per-type `format_with_items`.
trait Strftime {
    fn render(&self, items: &[Item<'_>], out: &mut String) -> std::fmt::Result;
}

impl Strftime for NaiveDateTime {
    fn render(&self, items: &[Item<'_>], out: &mut String) -> std::fmt::Result {
        write!(out, "{}", self.format_with_items(items.iter()))
    }
}

struct DelayedDate(NaiveDate);

impl Strftime for DelayedDate {
    fn render(&self, items: &[Item<'_>], out: &mut String) -> std::fmt::Result {
        write!(out, "{}", self.0.format_with_items(items.iter()))
    }
}

struct DelayedTime(NaiveTime);

impl Strftime for DelayedTime {
    fn render(&self, items: &[Item<'_>], out: &mut String) -> std::fmt::Result {
        write!(out, "{}", self.0.format_with_items(items.iter()))
    }
}

fn expect_date(value: &ServerValue) -> Result<NaiveDate> {
    let wrong = || TacoError::InvalidArguments("expected a date object".to_string());
    let object = value.as_object().ok_or_else(wrong)?;
    let guard = object.lock().expect("object lock poisoned");
    guard
        .as_any()
        .downcast_ref::<Date>()
        .map(|d| d.value)
        .ok_or_else(wrong)
}

fn expect_time(value: &ServerValue) -> Result<NaiveTime> {
    let wrong = || TacoError::InvalidArguments("expected a time object".to_string());
    let object = value.as_object().ok_or_else(wrong)?;
    let guard = object.lock().expect("object lock poisoned");
    guard
        .as_any()
        .downcast_ref::<Time>()
        .map(|t| t.value)
        .ok_or_else(wrong)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taco_core::ServerState;

    #[test]
    fn datetime_construct_and_strftime_via_dispatch() {
        let mut state = ServerState::new(registry());
        state.handle(&json!({
            "action": "import_module",
            "name": "datetime",
            "args": [],
            "kwargs": {},
        }));

        let response = state.handle(&json!({
            "action": "construct_object",
            "class": "datetime.datetime",
            "args": [2000, 12, 25],
            "kwargs": {},
        }));
        assert_eq!(response["result"], json!({"_Taco_Object_": 1}));

        let response = state.handle(&json!({
            "action": "call_method",
            "number": 1,
            "name": "strftime",
            "args": ["%Y-%m-%d"],
            "kwargs": {},
            "context": null,
        }));
        assert_eq!(response["result"], json!("2000-12-25"));
    }

    #[test]
    fn invalid_date_is_an_argument_error() {
        let err = make_datetime(2000, 13, 1, 0, 0, 0).unwrap_err();
        assert!(matches!(err, TacoError::InvalidArguments(_)), "got {err:?}");
    }

    #[test]
    fn bad_strftime_pattern_is_rejected() {
        let value = make_datetime(2000, 12, 25, 0, 0, 0).unwrap();
        let err = strftime(&value, "%! nope").unwrap_err();
        assert!(matches!(err, TacoError::InvalidArguments(_)), "got {err:?}");
    }

    #[test]
    fn replace_overrides_only_named_fields() {
        let mut dt = DateTime {
            value: make_datetime(2000, 12, 25, 15, 0, 0).unwrap(),
        };
        let args = CallArgs {
            args: Vec::new(),
            kwargs: [("year".to_string(), ServerValue::from(2010i64))]
                .into_iter()
                .collect(),
        };
        let replaced = dt.call_method("replace", args).unwrap();
        let object = replaced.as_object().unwrap();
        let guard = object.lock().expect("object lock poisoned");
        let inner = guard.as_any().downcast_ref::<DateTime>().unwrap();
        assert_eq!(inner.value, make_datetime(2010, 12, 25, 15, 0, 0).unwrap());
    }

    #[test]
    fn sleep_rejects_negative_durations() {
        let mut state = ServerState::new(registry());
        state.handle(&json!({
            "action": "import_module",
            "name": "time",
            "args": [],
            "kwargs": {},
        }));
        let response = state.handle(&json!({
            "action": "call_function",
            "name": "time.sleep",
            "args": [-1],
            "kwargs": {},
            "context": null,
        }));
        assert_eq!(response["action"], "exception");
    }
}
