use crate::error::ScheduleError;

/// Minimum interval for periodic jobs.
pub const MIN_PERIOD_SECS: i64 = 60;

/// A parsed trigger spec, before resolution against the clock and timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Fires once, `seconds` from creation.
    OnceIn { seconds: i64 },
    /// Fires once at the next local HH:MM.
    OnceAt { hour: u32, minute: u32 },
    Daily { hour: u32, minute: u32 },
    Periodic { interval_secs: i64 },
}

/// Parse the schedule grammar from tool arguments:
///
/// - `once` + `in N {minute|hour|day}`
/// - `once` + `at HH:MM`
/// - `daily` + `at HH:MM` (also accepted as kind `every day`)
/// - `periodic` + `N {minute|hour}` (also accepted as kind `every`)
pub fn parse_trigger(kind: &str, spec: &str) -> Result<Trigger, ScheduleError> {
    let kind = kind.trim().to_ascii_lowercase();
    let spec = spec.trim().to_ascii_lowercase();
    let bad = || ScheduleError::BadSpec(format!("{kind} {spec}"));

    match kind.as_str() {
        "once" => {
            if let Some(rest) = spec.strip_prefix("in ") {
                let (count, unit) = split_count_unit(rest).ok_or_else(bad)?;
                let seconds = count.checked_mul(unit_secs(unit).ok_or_else(bad)?).ok_or_else(bad)?;
                if seconds <= 0 {
                    return Err(bad());
                }
                Ok(Trigger::OnceIn { seconds })
            } else if let Some(rest) = spec.strip_prefix("at ") {
                let (hour, minute) = parse_hhmm(rest).ok_or_else(bad)?;
                Ok(Trigger::OnceAt { hour, minute })
            } else {
                Err(bad())
            }
        }
        "daily" | "every day" => {
            let rest = spec.strip_prefix("at ").unwrap_or(&spec);
            let (hour, minute) = parse_hhmm(rest).ok_or_else(bad)?;
            Ok(Trigger::Daily { hour, minute })
        }
        "periodic" | "every" => {
            let (count, unit) = split_count_unit(&spec).ok_or_else(bad)?;
            let unit_secs = unit_secs(unit).filter(|&s| s <= 3600).ok_or_else(bad)?;
            let interval_secs = count.checked_mul(unit_secs).ok_or_else(bad)?;
            if interval_secs < MIN_PERIOD_SECS {
                return Err(ScheduleError::BadSpec(format!(
                    "periodic interval below {MIN_PERIOD_SECS}s"
                )));
            }
            Ok(Trigger::Periodic { interval_secs })
        }
        _ => Err(bad()),
    }
}

fn split_count_unit(rest: &str) -> Option<(i64, &str)> {
    let mut parts = rest.split_whitespace();
    let count: i64 = parts.next()?.parse().ok()?;
    let unit = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((count, unit))
}

fn unit_secs(unit: &str) -> Option<i64> {
    match unit {
        "minute" | "minutes" | "min" => Some(60),
        "hour" | "hours" => Some(3600),
        "day" | "days" => Some(86_400),
        _ => None,
    }
}

fn parse_hhmm(rest: &str) -> Option<(u32, u32)> {
    let (hours, minutes) = rest.trim().split_once(':')?;
    let hour: u32 = hours.parse().ok()?;
    let minute: u32 = minutes.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}
