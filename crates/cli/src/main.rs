#![deny(unsafe_code)]
//! Diagnostic CLI for headless LibCarna rendering.
//!
//! Subcommands:
//! - `info` -- create a context and print the GL vendor and renderer
//! - `snapshot` -- fill a surface with a color and write it as PNG

mod error;
mod snapshot;

use std::path::PathBuf;
use std::process;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use error::CliError;
use libcarna_core::render::{FillStage, FrameRenderer, Region, StageView};
use libcarna_core::{CameraView, Color, Engine, NodeView};
use libcarna_egl::{ContextConfig, OffscreenContext, Surface};
use log::info;

#[derive(Parser)]
#[command(name = "libcarna", about = "Headless LibCarna rendering diagnostics")]
struct Cli {
    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Context configuration as a JSON string.
    #[arg(long, global = true, default_value = "{}")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an off-screen context and report the driver.
    Info,
    /// Render a solid fill off-screen and write a PNG snapshot.
    Snapshot {
        /// Surface width in pixels.
        #[arg(short = 'W', long, default_value_t = 256)]
        width: u32,

        /// Surface height in pixels.
        #[arg(short = 'H', long, default_value_t = 256)]
        height: u32,

        /// Fill color as `#rrggbb` or `#rrggbbaa`.
        #[arg(short, long, default_value = "#ff0000")]
        color: String,

        /// Background color behind the fill.
        #[arg(long, default_value = "#000000")]
        background: String,

        /// Fill only this region, as `x,y,width,height` from the top-left.
        #[arg(long, value_parser = parse_region)]
        region: Option<Region>,

        /// Output file path.
        #[arg(short, long, default_value = "snapshot.png")]
        output: PathBuf,
    },
}

fn parse_region(raw: &str) -> Result<Region, String> {
    let parts: Vec<u32> = raw
        .split(',')
        .map(|part| part.trim().parse::<u32>().map_err(|e| format!("{part:?}: {e}")))
        .collect::<Result<_, _>>()?;
    match parts[..] {
        [x, y, width, height] => Ok(Region { x, y, width, height }),
        _ => Err(format!("expected x,y,width,height, got {} values", parts.len())),
    }
}

fn context(config: &str) -> Result<Rc<OffscreenContext>, CliError> {
    let params: serde_json::Value = serde_json::from_str(config)
        .map_err(|e| CliError::Input(format!("invalid --config JSON: {e}")))?;
    let config = ContextConfig::from_json(&params).with_env(|key| std::env::var(key).ok());
    Ok(Rc::new(OffscreenContext::with_config(&config)?))
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Info => {
            let ctx = context(&cli.config)?;
            if cli.json {
                let info = serde_json::json!({
                    "vendor": ctx.vendor(),
                    "renderer": ctx.renderer(),
                    "display": ctx.source().to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Vendor:   {}", ctx.vendor());
                println!("Renderer: {}", ctx.renderer());
                println!("Display:  {}", ctx.source());
            }
        }
        Command::Snapshot {
            width,
            height,
            color,
            background,
            region,
            output,
        } => {
            let color = Color::from_hex(&color)?;
            let background = Color::from_hex(&background)?;
            let ctx = context(&cli.config)?;

            let engine = Engine::new_ref();
            let root = NodeView::create(&engine, "root");
            let camera = CameraView::create(&engine);
            root.attach_child(camera.as_ref())?;

            let renderer = FrameRenderer::new(ctx.clone(), &engine, width, height, false)?;
            renderer.set_background_color(background);
            let mut fill = FillStage::new(color);
            if let Some(region) = region {
                fill = fill.with_region(region);
            }
            renderer.append_stage(&StageView::create(&engine, fill))?;

            let mut surface = Surface::new(Rc::clone(&ctx), width, height)?;
            surface.begin()?;
            renderer.render(&camera, Some(&root))?;
            let frame = surface.end()?;
            snapshot::write_png(&frame, &output)?;
            info!("{} engine event(s) recorded", engine.borrow().events().len());

            if cli.json {
                let info = serde_json::json!({
                    "width": width,
                    "height": height,
                    "color": color.to_hex(),
                    "background": background.to_hex(),
                    "renderer": ctx.renderer(),
                    "output": output.display().to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                eprintln!(
                    "rendered {} ({width}x{height}) on {} -> {}",
                    color.to_hex(),
                    ctx.renderer(),
                    output.display()
                );
            }
        }
    }

    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let json_mode = cli.json;
    if let Err(e) = run(cli) {
        if json_mode {
            let j = serde_json::json!({"error": e.to_string(), "exit_code": e.exit_code()});
            eprintln!("{}", serde_json::to_string_pretty(&j).unwrap_or_default());
        } else {
            eprintln!("error: {e}");
        }
        process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_parses_four_values() {
        assert_eq!(
            parse_region("1, 2,30,40"),
            Ok(Region {
                x: 1,
                y: 2,
                width: 30,
                height: 40
            })
        );
    }

    #[test]
    fn region_rejects_wrong_arity_and_garbage() {
        assert!(parse_region("1,2,3").is_err());
        assert!(parse_region("1,2,3,x").is_err());
    }

    #[test]
    fn snapshot_arguments_parse() {
        let cli = Cli::try_parse_from([
            "libcarna", "--json", "snapshot", "-W", "64", "-H", "48", "--region", "0,0,8,8",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Command::Snapshot {
                width, height, region, ..
            } => {
                assert_eq!((width, height), (64, 48));
                assert_eq!(region.map(|r| r.width), Some(8));
            }
            Command::Info => panic!("expected snapshot"),
        }
    }

    #[test]
    fn invalid_config_json_is_input_error() {
        let err = context("{not json").unwrap_err();
        assert_eq!(err.exit_code(), 12);
    }
}
