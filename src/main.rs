use anyhow::{Context, Result};
use log::{debug, info, warn};

use smart_petri::config::EngineConfig;
use smart_petri::net::{Net, io};
use smart_petri::options::Options;
use smart_petri::report::AnalysisReport;
use smart_petri::session::Session;

fn main() -> Result<()> {
    if std::env::var("PN_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("PN_LOG")
            .write_style("PN_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    // PN_FLAGS 中的选项先解析，命令行参数可覆盖
    let mut flags = shellwords::split(&std::env::var("PN_FLAGS").unwrap_or_default())
        .context("PN_FLAGS has mismatched quotes")?;
    flags.extend(std::env::args().skip(1));
    let options = Options::parse_from_args(&flags)?;
    debug!("pn-sim options: {:?}", options);

    let config = EngineConfig::load_from_file(&options.config)?;
    let net = load(&options)?;
    net.log_diagnostics();

    if let Some(dot) = &options.dot {
        net.write_dot(dot)
            .with_context(|| format!("Failed to write dot file: {:?}", dot))?;
    }

    if options.action.analyzes() {
        let report = AnalysisReport::build(&net);
        println!("{report}");
        if let Some(output) = &options.output {
            report
                .save_to_file(output)
                .with_context(|| format!("Failed to write report: {:?}", output))?;
            info!("analysis report written to {:?}", output);
        }
    }

    if options.action.simulates() {
        let mut session = Session::new(net, config);
        session.start();
        let mut fired = 0;
        for _ in 0..options.ticks {
            if session.tick().fired.is_some() {
                fired += 1;
            }
        }
        session.stop();
        info!(
            "simulated {} ticks, {fired} transitions fired, {} tokens held",
            options.ticks,
            session.net().marking().total()
        );
        for (_, place) in session.net().places() {
            match place.value() {
                Some(value) => println!("{}: {} ({value})", place.name(), place.tokens()),
                None => println!("{}: {}", place.name(), place.tokens()),
            }
        }
    }
    Ok(())
}

fn load(options: &Options) -> Result<Net> {
    let Some(input) = &options.input else {
        warn!("no input snapshot given, using an empty net");
        return Ok(Net::empty());
    };
    if options.lenient {
        let (net, skipped) = io::load_net_lenient(input)
            .with_context(|| format!("Failed to load net: {:?}", input))?;
        if !skipped.is_empty() {
            warn!("{} snapshot elements skipped", skipped.len());
        }
        Ok(net)
    } else {
        io::load_net(input).with_context(|| format!("Failed to load net: {:?}", input))
    }
}
