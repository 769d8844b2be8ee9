use anyhow::Result;
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Xtask {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Build {
        #[arg(short, long, default_value_t = String::from("screen"))]
        demo: String,
        #[arg(short, long, default_value_t = String::from("dev"))]
        profile: String,
    },
}

fn main() {
    let sh = match Shell::new() {
        Ok(sh) => sh,
        Err(err) => return fatal_error(err.into()),
    };
    let xtask = Xtask::parse();
    let result = match &xtask.command {
        Commands::Build { profile, demo } => build(sh, demo, profile),
    };
    if let Err(err) = result {
        fatal_error(err);
    }
}

fn fatal_error(err: anyhow::Error) {
    eprintln!("{}", err);
    std::process::exit(1);
}

fn build(sh: Shell, demo: &str, profile: &str) -> Result<()> {
    let cargo = std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    let target_dir = if profile == "dev" { "debug" } else { profile };
    cmd!(
        sh,
        "{cargo} build --profile {profile} --target wasm32-unknown-unknown --package {demo}"
    )
    .run()?;
    cmd!(sh, "wasm-bindgen --out-dir web/pkg --out-name {demo} --target web target/wasm32-unknown-unknown/{target_dir}/{demo}.wasm").run()?;
    cmd!(
        sh,
        "wasm-opt -Oz --output web/pkg/{demo}_bg.wasm.optimized web/pkg/{demo}_bg.wasm"
    )
    .run()?;
    sh.copy_file(
        format!("web/pkg/{demo}_bg.wasm.optimized"),
        format!("web/pkg/{demo}_bg.wasm"),
    )?;
    sh.remove_path(format!("web/pkg/{demo}_bg.wasm.optimized"))?;
    Ok(())
}
