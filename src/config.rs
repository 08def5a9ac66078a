use crate::providers::VendorProfile;
use crate::store::{Namespace, Store};
use chrono_tz::Tz;

/// Runtime configuration, loaded once at boot from the persistent store.
///
/// Missing LLM or chat configuration is not fatal: the runtime comes up with
/// the corresponding subsystem disabled and tells the user what to set.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: Option<LlmConfig>,
    pub telegram: Option<TelegramConfig>,
    pub timezone: Tz,
    pub gpio: GpioPolicy,
    pub limits: Limits,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub vendor: VendorProfile,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: String,
    /// The single chat id allowed to talk to this device. Zero is never valid.
    pub chat_id: i64,
}

/// Which GPIO pins the LLM may drive. An explicit allow-list wins over the
/// range check when present.
#[derive(Debug, Clone)]
pub struct GpioPolicy {
    pub min_pin: u8,
    pub max_pin: u8,
    pub allowed: Option<Vec<u8>>,
}

impl Default for GpioPolicy {
    fn default() -> Self {
        Self {
            min_pin: 0,
            max_pin: 39,
            allowed: None,
        }
    }
}

impl GpioPolicy {
    pub fn is_allowed(&self, pin: u8) -> bool {
        match &self.allowed {
            Some(list) => list.contains(&pin),
            None => pin >= self.min_pin && pin <= self.max_pin,
        }
    }

    /// Human-readable description of the permitted set, used in rejections.
    pub fn describe_allowed(&self) -> String {
        match &self.allowed {
            Some(list) => list
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            None => format!("{}-{}", self.min_pin, self.max_pin),
        }
    }

    pub fn parse_csv(csv: &str) -> Option<Vec<u8>> {
        let pins: Vec<u8> = csv
            .split(',')
            .filter_map(|part| part.trim().parse().ok())
            .collect();
        if pins.is_empty() { None } else { Some(pins) }
    }
}

#[derive(Debug, Clone)]
pub struct Limits {
    pub hourly_cap: u32,
    pub daily_cap: u32,
    pub request_timeout_secs: u64,
    pub scheduler_tick_secs: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            hourly_cap: 30,
            daily_cap: 200,
            request_timeout_secs: 30,
            scheduler_tick_secs: 60,
        }
    }
}

impl Config {
    pub fn load(store: &dyn Store) -> Self {
        let llm = Self::load_llm(store);
        let telegram = Self::load_telegram(store);
        let timezone = Self::load_timezone(store);

        Self {
            llm,
            telegram,
            timezone,
            gpio: GpioPolicy::default(),
            limits: Limits::default(),
        }
    }

    fn load_llm(store: &dyn Store) -> Option<LlmConfig> {
        let provider = store.get(Namespace::LlmConfig, "provider").ok()?;
        let Some(vendor) = VendorProfile::parse(&provider) else {
            tracing::warn!("Unknown LLM provider '{provider}' configured; LLM disabled");
            return None;
        };
        let api_key = store
            .get(Namespace::LlmConfig, "api_key")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())?;
        let model = store
            .get(Namespace::LlmConfig, "model")
            .unwrap_or_else(|_| vendor.default_model().to_string());

        Some(LlmConfig {
            vendor,
            api_key,
            model,
        })
    }

    fn load_telegram(store: &dyn Store) -> Option<TelegramConfig> {
        let token = store
            .get(Namespace::ChatConfig, "token")
            .ok()
            .filter(|t| !t.trim().is_empty())?;
        let chat_id = match store.get(Namespace::ChatConfig, "chat_id") {
            Ok(raw) => match parse_chat_id(&raw) {
                Some(id) => id,
                None => {
                    tracing::warn!("Invalid Telegram chat id '{raw}' in store");
                    0
                }
            },
            Err(_) => 0,
        };
        Some(TelegramConfig {
            token: token.trim().to_string(),
            chat_id,
        })
    }

    fn load_timezone(store: &dyn Store) -> Tz {
        match store.get(Namespace::Timezone, "posix") {
            Ok(name) => match name.trim().parse::<Tz>() {
                Ok(tz) => tz,
                Err(_) => {
                    tracing::warn!("Invalid timezone '{name}' in store, using UTC");
                    Tz::UTC
                }
            },
            Err(_) => Tz::UTC,
        }
    }
}

/// The active timezone, shared between the timezone tool, the scheduler and
/// the health report. `set_timezone` swaps it at runtime.
pub struct SharedTimezone(std::sync::RwLock<Tz>);

impl SharedTimezone {
    pub fn new(tz: Tz) -> Self {
        Self(std::sync::RwLock::new(tz))
    }

    pub fn get(&self) -> Tz {
        *self
            .0
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn set(&self, tz: Tz) {
        *self
            .0
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = tz;
    }
}

/// Chat ids arrive as decimal strings. Zero and garbage are both invalid;
/// zero doubles as the "not yet provisioned" marker.
pub fn parse_chat_id(raw: &str) -> Option<i64> {
    let parsed: i64 = raw.trim().parse().ok()?;
    if parsed == 0 { None } else { Some(parsed) }
}
