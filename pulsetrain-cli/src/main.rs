//! Pulsetrain CLI — run a trigger train and watch it tick.
//!
//! Parameters come from the settings file, overridden by flags; the run
//! itself happens on the engine's thread while this one renders a
//! status line from the pure phase clock and waits for Enter (or run
//! completion). The finished run is appended to a JSON-lines log.

use std::error::Error;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use pulsetrain_core::clock::Phase;
use pulsetrain_engine::session::RunHandle;
use pulsetrain_engine::sim::SimDriver;
use pulsetrain_engine::Outcome;

mod settings;
use settings::TriggerSettings;

#[derive(Debug, Default)]
struct Args {
    settings_path: Option<PathBuf>,
    records_path: Option<PathBuf>,
    save_settings: bool,
    driver: Option<String>,
    device: Option<String>,
    channel: Option<String>,
    sample_rate: Option<f64>,
    trigger: Option<f64>,
    interval: Option<f64>,
    delay: Option<f64>,
    triggers: Option<u32>,
    infinite: Option<bool>,
}

fn parse_args() -> Args {
    let mut a = Args::default();
    for s in std::env::args().skip(1) {
        if s == "--save-settings" { a.save_settings = true; continue; }
        if s == "--infinite"      { a.infinite = Some(true);  continue; }
        if s == "--finite"        { a.infinite = Some(false); continue; }
        if let Some(rest) = s.strip_prefix("--settings=")     { a.settings_path = Some(rest.into());   continue; }
        if let Some(rest) = s.strip_prefix("--records=")      { a.records_path  = Some(rest.into());   continue; }
        if let Some(rest) = s.strip_prefix("--driver=")       { a.driver  = Some(rest.to_string());    continue; }
        if let Some(rest) = s.strip_prefix("--device=")       { a.device  = Some(rest.to_string());    continue; }
        if let Some(rest) = s.strip_prefix("--channel=")      { a.channel = Some(rest.to_string());    continue; }
        if let Some(rest) = s.strip_prefix("--sample-rate=")  { a.sample_rate = rest.parse().ok();     continue; }
        if let Some(rest) = s.strip_prefix("--trigger=")      { a.trigger  = rest.parse().ok();        continue; }
        if let Some(rest) = s.strip_prefix("--interval=")     { a.interval = rest.parse().ok();        continue; }
        if let Some(rest) = s.strip_prefix("--delay=")        { a.delay    = rest.parse().ok();        continue; }
        if let Some(rest) = s.strip_prefix("--triggers=")     { a.triggers = rest.parse().ok();        continue; }
        eprintln!("[warn] unknown arg: {s}");
    }
    a
}

fn apply_overrides(s: &mut TriggerSettings, a: &Args) {
    if let Some(v) = &a.device      { s.device = v.clone(); }
    if let Some(v) = &a.channel     { s.channel = v.clone(); }
    if let Some(v) = a.sample_rate  { s.sampling_rate = v; }
    if let Some(v) = a.trigger      { s.trigger_duration = v; }
    if let Some(v) = a.interval     { s.inter_trigger_interval = v; }
    if let Some(v) = a.delay        { s.initial_trigger_delay = v; }
    if let Some(v) = a.triggers     { s.nb_triggers = v; s.infinite = false; }
    if let Some(v) = a.infinite     { s.infinite = v; }
}

fn status_line(handle: &RunHandle) -> String {
    let st = handle.status();
    match st.phase {
        Phase::InitialDelay => format!("initial delay — {:.1} s until first trigger", st.remaining),
        Phase::Active => format!(
            "TRIGGER #{} — {:.2} s left in pulse",
            st.cycle_index + 1,
            st.remaining
        ),
        Phase::Interval => format!(
            "interval after trigger #{} — next in {:.1} s",
            st.cycle_index + 1,
            st.remaining
        ),
        Phase::Done => "all triggers emitted".to_string(),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    let args = parse_args();

    let settings_path = args
        .settings_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("trigger_settings.json"));
    let records_path = args
        .records_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("runs.jsonl"));

    let mut settings = TriggerSettings::load(&settings_path)?;
    apply_overrides(&mut settings, &args);
    if args.save_settings {
        settings.save(&settings_path)?;
    }

    // Bad parameters are rejected here, before any hardware is touched.
    let params = settings.to_params()?;

    println!("pulsetrain — trigger-train generator\n");
    println!("Channel: {}", params.channel_path());
    println!(
        "Trigger {:.3} s @ {:.2} V, interval {:.3} s, initial delay {:.3} s",
        params.trigger_duration(),
        params.active_voltage(),
        params.inter_trigger_interval(),
        params.initial_trigger_delay()
    );
    match params.expected_duration() {
        Some(d) => println!("Mode: {} triggers (~{:.1} s)", settings.nb_triggers, d),
        None => println!("Mode: infinite (until stopped)"),
    }

    let driver_name = args.driver.as_deref().unwrap_or("sim").to_string();
    tracing::info!("starting run on driver `{driver_name}`");
    let mut handle = match driver_name.as_str() {
        "sim" => pulsetrain_engine::start(SimDriver::new(), params)?,
        #[cfg(feature = "audio")]
        "audio" => pulsetrain_engine::start(pulsetrain_engine::audio::AudioDriver::new(), params)?,
        other => return Err(format!("unknown driver: {other}").into()),
    };

    println!("Press Enter to stop…\n");
    let stopper = handle.stopper();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        stopper.trip();
    });

    let outcome = loop {
        if let Some(out) = handle.try_outcome() {
            break out;
        }
        print!("\r[run] {:<60}", status_line(&handle));
        let _ = std::io::stdout().flush();
        std::thread::sleep(Duration::from_millis(200));
    };

    // Either way the channel has been forced back to neutral; only the
    // displayed reason differs.
    match &outcome {
        Outcome::Done => println!("\n\nGeneration finished — channel is safe."),
        Outcome::Cancelled => println!("\n\nGeneration stopped by user — channel is safe."),
        Outcome::Error(msg) => println!("\n\nGeneration stopped ({msg}) — channel is safe."),
    }

    let (_, record) = handle.wait();
    settings::append_run_record(&records_path, &record)?;
    println!("Run record appended to {}", records_path.display());

    Ok(())
}
