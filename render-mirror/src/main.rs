use std::cell::RefCell;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::rc::Rc;
use std::thread;

use clap::{App, Arg, ArgMatches};
use indicatif::{ProgressBar, ProgressStyle};
use rootcause::prelude::*;
use strum::IntoEnumIterator;
use tracing::info;
use tracing_subscriber::EnvFilter;

use acmi_telemetry::analyzer::record_dump::RecordDump;
use acmi_telemetry::analyzer::survey::{Survey, SurveyStats};
use acmi_telemetry::analyzer::world::WorldState;
use acmi_telemetry::classification::ObjectClass;
use acmi_telemetry::feed::{RealTimeSession, read_lines};

use acmi_render_mirror::config::MirrorConfig;
use acmi_render_mirror::pipeline::{Pipeline, join_producer};

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn replay_file(pipeline: &mut Pipeline, path: &str) -> Result<(), rootcause::Report> {
    println!("Reading {path}...");
    let lines = read_lines(path).context("Failed to read recording")?;

    let progress = ProgressBar::new(lines.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} lines ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    // Tick whenever a new frame starts so each frame is applied as a batch.
    for line in lines {
        if line.starts_with('#') && !pipeline.queue().is_empty() {
            let stats = pipeline.tick();
            progress.set_message(format!("{} objects", stats.entities));
        }
        pipeline.push_line(line);
        progress.inc(1);
    }
    pipeline.tick();
    progress.finish_and_clear();
    Ok(())
}

fn follow_live(pipeline: &mut Pipeline, config: &MirrorConfig) -> Result<(), rootcause::Report> {
    let feed = config.realtime_config();
    println!("Connecting to {}:{}...", feed.host, feed.port);
    let session = RealTimeSession::connect(&feed).context("Failed to connect to telemetry server")?;
    println!("Connected to {}", session.server_name());

    let producer = session.spawn(pipeline.queue().sender());
    let spinner = ProgressBar::new_spinner();
    let interval = config.tick_interval();
    while !producer.is_finished() {
        thread::sleep(interval);
        let stats = pipeline.tick();
        spinner.set_message(format!(
            "{} objects, {} icons, {} lock lines",
            stats.entities, stats.icons, stats.lock_lines
        ));
        spinner.tick();
    }
    pipeline.tick();
    spinner.finish_and_clear();

    let received = join_producer(producer).context("Telemetry feed failed")?;
    info!("feed closed after {received} lines");
    print_summary(pipeline);
    pipeline.clear();
    Ok(())
}

fn print_summary(pipeline: &Pipeline) {
    let world = pipeline.world();
    let decoder = world.decoder().stats();
    println!(
        "{} lines, {} records, {} ignored, {} malformed, {} unsupported",
        decoder.lines, decoder.records, decoder.ignored, decoder.malformed, decoder.unsupported
    );
    for class in ObjectClass::iter() {
        println!("{:>12}: {}", class.to_string(), world.entities_of(class).count());
    }
    for report in pipeline.memory_report() {
        let memory = report.memory;
        println!(
            "{:>20}: {}/{} slots ({:.0}%), {} of {} bytes",
            report.facet,
            memory.count,
            memory.capacity,
            memory.utilization() * 100.0,
            memory.bytes_used,
            memory.bytes_allocated
        );
    }
}

fn build_cli() -> App<'static, 'static> {
    App::new("ACMI Mirror")
        .about("Mirrors an ACMI telemetry recording or live feed into packed render arrays")
        .arg(
            Arg::with_name("INPUT")
                .help("The .acmi/.txt.acmi/.zip.acmi recording to replay")
                .required_unless_one(&["LIVE", "GENERATE_CONFIG"])
                .index(1),
        )
        .arg(
            Arg::with_name("LIVE")
                .help("Attach to a real-time telemetry server instead of reading a file")
                .long("live"),
        )
        .arg(
            Arg::with_name("CONFIG")
                .help("Path to a TOML config file")
                .long("config")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("GENERATE_CONFIG")
                .help("Print a default config file and exit")
                .long("generate-config"),
        )
        .arg(
            Arg::with_name("DUMP_RECORDS")
                .help("Write every decoded record as JSON lines to this file")
                .long("dump-records")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("SURVEY")
                .help("Print record statistics as JSON when done")
                .long("survey"),
        )
        .arg(
            Arg::with_name("HOST")
                .help("Telemetry server host")
                .long("host")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("PORT")
                .help("Telemetry server port")
                .long("port")
                .takes_value(true)
                .validator(|v| v.parse::<u16>().map(|_| ()).map_err(|e| e.to_string())),
        )
        .arg(
            Arg::with_name("PASSWORD")
                .help("Telemetry server password")
                .long("password")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("CLIENT_NAME")
                .help("Name announced to the telemetry server")
                .long("client-name")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("ICON_SET")
                .help("Icon symbology")
                .long("icon-set")
                .takes_value(true)
                .possible_values(&["classic", "ntds"]),
        )
        .arg(
            Arg::with_name("ICON_SCALE")
                .help("Icon size multiplier")
                .long("icon-scale")
                .takes_value(true)
                .validator(|v| v.parse::<f32>().map(|_| ()).map_err(|e| e.to_string())),
        )
        .arg(
            Arg::with_name("NO_VELOCITY_VECTORS")
                .help("Do not build velocity vectors")
                .long("no-velocity-vectors"),
        )
        .arg(
            Arg::with_name("NO_LOCK_LINES")
                .help("Do not build lock lines")
                .long("no-lock-lines"),
        )
        .arg(
            Arg::with_name("VERBOSE")
                .help("Log at debug level unless RUST_LOG is set")
                .short("v")
                .long("verbose"),
        )
}

fn load_config(matches: &ArgMatches) -> Result<MirrorConfig, rootcause::Report> {
    let mut config = match matches.value_of("CONFIG") {
        Some(path) => MirrorConfig::load(Path::new(path))?,
        None => MirrorConfig::default(),
    };
    config.apply_cli_overrides(matches);
    Ok(config)
}

fn main() -> Result<(), rootcause::Report> {
    let matches = build_cli().get_matches();

    if matches.is_present("GENERATE_CONFIG") {
        print!("{}", MirrorConfig::generate_default_toml());
        return Ok(());
    }

    init_logging(matches.is_present("VERBOSE"));
    let config = load_config(&matches)?;

    let world = WorldState::new().with_bullseye_id(config.bullseye_id.as_str());
    let mut pipeline = Pipeline::with_world(world, config.mirror_options());

    if let Some(path) = matches.value_of("DUMP_RECORDS") {
        let out = File::create(path).context("Failed to create record dump")?;
        pipeline.add_analyzer(Box::new(RecordDump::new(BufWriter::new(out))));
    }
    let survey = Rc::new(RefCell::new(SurveyStats::new()));
    if matches.is_present("SURVEY") {
        pipeline.add_analyzer(Box::new(Survey::new(survey.clone())));
    }

    if matches.is_present("LIVE") {
        follow_live(&mut pipeline, &config)?;
    } else if let Some(path) = matches.value_of("INPUT") {
        replay_file(&mut pipeline, path)?;
        print_summary(&pipeline);
    }
    pipeline.finish();

    if matches.is_present("SURVEY") {
        let json = serde_json::to_string_pretty(&*survey.borrow()).context("Failed to serialize survey")?;
        println!("{json}");
    }

    println!("Done!");
    Ok(())
}
