// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: recipe file
fn recipe_arg() -> Arg {
    Arg::new("recipe").required(true).help("Path to the recipe file")
}

/// Common argument: recipe content type
fn content_type_arg() -> Arg {
    Arg::new("content_type")
        .long("content-type")
        .value_name("TYPE")
        .help("Recipe content type (inferred from .yml/.yaml)")
}

fn build_cli() -> Command {
    Command::new("berth")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Berth Contributors")
        .about("Multi-container development environments on a container daemon")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Path to the configuration file"),
        )
        .arg(
            Arg::new("endpoint")
                .long("endpoint")
                .value_name("URI")
                .global(true)
                .help("Daemon endpoint (unix:///path, tcp://host:port, http(s)://...)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .subcommand(
            Command::new("env")
                .about("Environment recipe commands")
                .subcommand(
                    Command::new("validate")
                        .about("Build an environment from a recipe and report problems")
                        .arg(recipe_arg())
                        .arg(content_type_arg())
                        .arg(
                            Arg::new("machines")
                                .short('m')
                                .long("machine")
                                .value_name("NAME")
                                .action(ArgAction::Append)
                                .help("Machine declared outside the recipe (repeatable)"),
                        ),
                )
                .subcommand(
                    Command::new("order")
                        .about("Show services in start order with their weights")
                        .arg(recipe_arg())
                        .arg(content_type_arg()),
                ),
        )
        .subcommand(
            Command::new("daemon")
                .about("Container daemon commands")
                .subcommand(Command::new("ping").about("Check that the daemon answers"))
                .subcommand(Command::new("version").about("Show daemon version information"))
                .subcommand(
                    Command::new("request")
                        .about("Send a raw request and print the response")
                        .arg(Arg::new("method").required(true).help("Request method"))
                        .arg(Arg::new("path").required(true).help("Request path"))
                        .arg(
                            Arg::new("query")
                                .short('q')
                                .long("query")
                                .value_name("NAME=VALUE")
                                .action(ArgAction::Append)
                                .help("Query parameter (repeatable)"),
                        )
                        .arg(
                            Arg::new("headers")
                                .short('H')
                                .long("header")
                                .value_name("HEADER")
                                .action(ArgAction::Append)
                                .help("Header as 'Name: value' (repeatable)"),
                        )
                        .arg(
                            Arg::new("data")
                                .short('d')
                                .long("data")
                                .help("Request body"),
                        ),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell", "elvish"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let mut buffer = Vec::new();
    if let Err(e) = Man::new(build_cli()).render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("berth.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
