use clap::{
    app_from_crate, crate_authors, crate_description, crate_name, crate_version,
    AppSettings, Arg, ArgMatches,
};
use std::path::PathBuf;

use crate::validators::*;

const CONFIG_ARG: &str = "config";

pub struct Args {
    pub config_path: PathBuf,
}

impl Args {
    pub fn parse() -> Self {
        let matches = get_matches();

        Self {
            // defaulted, so always present
            config_path: PathBuf::from(matches.value_of(CONFIG_ARG).unwrap_or("config.yaml")),
        }
    }
}

fn get_matches() -> ArgMatches<'static> {
    app_from_crate!()
        .setting(AppSettings::GlobalVersion)
        .arg(
            Arg::with_name(CONFIG_ARG)
                .help("The YAML configuration describing the bounding box, cell size and run name. Output is written to `output/<name>` next to this file.")
                .validator(is_config_file)
                .default_value("config.yaml")
                .takes_value(true)
                .short("c")
                .long("config"),
        )
        .get_matches()
}
