/// Basic usage example: feed tilt and lock callbacks, read JSON events
use unlock_sensing::{LatestFix, LocationFix, MonitorConfig, UnlockMonitor};

fn main() -> unlock_sensing::Result<()> {
    println!("=== Unlock Sensing Engine: Basic Example ===\n");

    // One second of history at 50 Hz keeps the demo short
    let mut config = MonitorConfig::default();
    config.tilt.window_duration_ms = 1000;

    let fix = LocationFix {
        latitude: 52.520008,
        longitude: 13.404954,
        altitude_m: 34.0,
        speed_mps: 0.0,
    };
    let mut monitor = UnlockMonitor::new(config)?.with_location(LatestFix::with_fix(fix));
    let events = monitor.listen();

    // Phone in hand, unlocked: tilted and wobbling
    monitor.on_lock_signal(false, 0);
    let mut t = 0;
    while t < 1500 {
        let wobble = if (t / 20) % 2 == 0 { 0.05 } else { -0.05 };
        monitor.on_tilt_sample(0.8 + wobble, t);
        monitor.poll(t);
        t += 20;
    }

    // Set down on a table and forgotten
    while t < 3500 {
        monitor.on_tilt_sample(0.01, t);
        monitor.poll(t);
        t += 20;
    }

    monitor.unlisten();

    let mut tilt_reports = 0;
    for record in events.try_iter() {
        if record.contains("TILT_EVENT") {
            tilt_reports += 1;
            continue;
        }
        println!("{record}");
    }
    println!("\n{tilt_reports} tilt reports, {} alarm(s)", monitor.alarm_count());
    Ok(())
}
