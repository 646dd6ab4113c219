use std::thread;
use std::time::{Duration, Instant};

use tilefall_client::bootstrap::{self, ClientConfig};
use tilefall_client::session::{PollPolicy, Session, SessionConfig};
use tilefall_client::world::HeroProfile;
use tilefall_client::TcpAuthorityClient;
use tilefall_engine::{CountingSink, StepConfig};
use tracing::info;

const FRAME_BUDGET: Duration = Duration::from_millis(16);

fn main() {
    bootstrap::init_tracing();
    info!("=== Tilefall client startup ===");

    let config = ClientConfig::from_env();
    info!(
        authority = %config.authority_addr,
        hero_id = config.hero_id,
        hero = %config.hero_name,
        map = %config.map,
        poll_ms = config.poll_interval.as_millis() as u64,
        "client_config"
    );

    let transport = TcpAuthorityClient::new(config.authority_addr.clone());
    let session_config = SessionConfig {
        profile: HeroProfile {
            hero_id: config.hero_id,
            name: config.hero_name.clone(),
            map: config.map.clone(),
            speed: config.hero_speed,
        },
        seed: config.seed,
        step: StepConfig::default(),
        poll: PollPolicy {
            interval: config.poll_interval,
            ..PollPolicy::default()
        },
        stats_interval: Duration::from_secs(5),
    };
    let mut session = Session::new(session_config, transport);

    // Headless host loop: one frame callback per budget slice, forever.
    let mut sink = CountingSink::default();
    loop {
        let frame_start = Instant::now();
        sink.drawn.clear();
        session.on_host_frame(frame_start, &mut sink);

        let elapsed = frame_start.elapsed();
        if elapsed < FRAME_BUDGET {
            thread::sleep(FRAME_BUDGET - elapsed);
        }
    }
}
