use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::combat::unit::HeroId;

pub const AUTHORITY_ENV_VAR: &str = "TILEFALL_AUTHORITY";
pub const HERO_ID_ENV_VAR: &str = "TILEFALL_HERO_ID";
pub const HERO_NAME_ENV_VAR: &str = "TILEFALL_HERO_NAME";
pub const MAP_ENV_VAR: &str = "TILEFALL_MAP";
pub const POLL_MS_ENV_VAR: &str = "TILEFALL_POLL_MS";
pub const SEED_ENV_VAR: &str = "TILEFALL_SEED";

const DEFAULT_AUTHORITY_ADDR: &str = "127.0.0.1:46801";
const DEFAULT_HERO_ID: HeroId = 1;
const DEFAULT_HERO_NAME: &str = "wanderer";
const DEFAULT_MAP: &str = "outskirts";
const DEFAULT_POLL_MS: u64 = 2000;
const DEFAULT_HERO_SPEED: f32 = 2.5;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub authority_addr: String,
    pub hero_id: HeroId,
    pub hero_name: String,
    pub hero_speed: f32,
    pub map: String,
    pub poll_interval: Duration,
    pub seed: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            authority_addr: DEFAULT_AUTHORITY_ADDR.to_string(),
            hero_id: DEFAULT_HERO_ID,
            hero_name: DEFAULT_HERO_NAME.to_string(),
            hero_speed: DEFAULT_HERO_SPEED,
            map: DEFAULT_MAP.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            seed: DEFAULT_HERO_ID as u64,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let hero_id = parse_number(
            HERO_ID_ENV_VAR,
            env::var(HERO_ID_ENV_VAR).ok().as_deref(),
            DEFAULT_HERO_ID,
        );
        let poll_ms = parse_number(
            POLL_MS_ENV_VAR,
            env::var(POLL_MS_ENV_VAR).ok().as_deref(),
            DEFAULT_POLL_MS,
        );
        // The RNG seed follows the hero identity unless pinned explicitly.
        let seed = parse_number(
            SEED_ENV_VAR,
            env::var(SEED_ENV_VAR).ok().as_deref(),
            hero_id.unsigned_abs(),
        );
        Self {
            authority_addr: string_or_default(env::var(AUTHORITY_ENV_VAR).ok(), DEFAULT_AUTHORITY_ADDR),
            hero_id,
            hero_name: string_or_default(env::var(HERO_NAME_ENV_VAR).ok(), DEFAULT_HERO_NAME),
            hero_speed: DEFAULT_HERO_SPEED,
            map: string_or_default(env::var(MAP_ENV_VAR).ok(), DEFAULT_MAP),
            poll_interval: Duration::from_millis(poll_ms.max(1)),
            seed,
        }
    }
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn parse_number<T>(env_var: &'static str, raw: Option<&str>, default: T) -> T
where
    T: FromStr + Copy,
{
    match raw {
        None => default,
        Some(value) => match value.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(env_var, value, "invalid_env_value_using_default");
                default
            }
        },
    }
}

fn string_or_default(raw: Option<String>, default: &str) -> String {
    match raw {
        Some(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}
