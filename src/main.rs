use bindweave::binding::{BindingDefinition, Mapping, Weaver};
use bindweave::jvm::{Error, ErrorCategory};
use bindweave::{Session, Settings};

use clap::{crate_version, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process::ExitCode;

fn cli() -> Command {
    Command::new("bindweave")
        .version(crate_version!())
        .about("Weaves XML binding code into compiled Java classes")
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .value_name("DIR")
                .help("Root directory of classes to modify (repeatable)")
                .action(ArgAction::Append)
                .value_parser(clap::value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("classpath")
                .long("classpath")
                .value_name("DIR")
                .help("Root directory of classes which are only referenced (repeatable)")
                .action(ArgAction::Append)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("preserve")
                .long("preserve")
                .value_name("CLASS")
                .help("Class which must not be modified (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("adapter package")
                .long("adapter-package")
                .value_name("PKG")
                .help("Package for the shared adapter class"),
        )
        .arg(
            Arg::new("name")
                .short('n')
                .long("name")
                .value_name("BINDING")
                .help("Name of the binding, used in generated method names")
                .default_value("binding"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log more (repeat for even more)")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("verify")
                .long("verify")
                .help("Re-read and check modified classes before writing them")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("track branches")
                .long("track-branches")
                .help("Log every branch created and resolved")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("load")
                .long("load")
                .help("Test load the modified classes")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("MAPPING")
                .help("Mapping, as CLASS=ELEMENT:FIELD[@ELEMENT][/STYLE],...")
                .action(ArgAction::Append)
                .required(true),
        )
}

fn settings(matches: &ArgMatches) -> Result<Settings, Error> {
    let search_paths = matches
        .get_many::<PathBuf>("path")
        .map(|paths| paths.cloned().collect())
        .unwrap_or_default();
    let mut settings = Settings::new(search_paths)?;
    if let Some(classpath) = matches.get_many::<PathBuf>("classpath") {
        settings.classpath = classpath.cloned().collect();
    }
    for class in matches.get_many::<String>("preserve").into_iter().flatten() {
        settings.preserve_class(class.replace('.', "/"))?;
    }
    settings.adapter_package = matches
        .get_one::<String>("adapter package")
        .map(|package| package.replace('.', "/"));
    settings.verify = matches.get_flag("verify");
    settings.track_branches = matches.get_flag("track branches");
    Ok(settings)
}

fn run(matches: &ArgMatches) -> Result<(), Error> {
    let binding = BindingDefinition {
        name: matches
            .get_one::<String>("name")
            .cloned()
            .unwrap_or_default(),
        mappings: matches
            .get_many::<String>("MAPPING")
            .into_iter()
            .flatten()
            .map(|mapping| mapping.parse::<Mapping>())
            .collect::<Result<_, _>>()?,
    };

    let session = Session::new(settings(matches)?);
    let report = Weaver::new(&session).weave(&[binding])?;
    for method in &report.methods {
        log::debug!("Generated {}", method);
    }
    session.commit(&report.dispositions)?;

    if matches.get_flag("load") {
        log::warn!("Test loading needs a JVM, skipping it");
    }
    log::info!(
        "{} class(es) modified, {} unchanged, {} deleted, {} stale method(s) purged",
        report.dispositions.modified.len(),
        report.dispositions.unchanged.len(),
        report.dispositions.deleted.len(),
        report.purged
    );
    Ok(())
}

fn main() -> ExitCode {
    let matches = cli().get_matches();

    let level = match matches.get_count("verbose") {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(match err.category() {
                ErrorCategory::Configuration => 1,
                ErrorCategory::Io => 2,
                ErrorCategory::Internal => 3,
            })
        }
    }
}
