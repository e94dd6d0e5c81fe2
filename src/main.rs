use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use worldmap::config::AppConfig;
use worldmap::data::DatasetCache;
use worldmap::pipeline::{render_view, MapMode, MapRequest, View};
use worldmap::prepare::default_highlights;
use worldmap::projection::Projection;
use worldmap::{render, server};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one map to a PNG file
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// "Map Cosmetics", "Map Visual Hierarchy", "Choropleth Map", "Geo Projection"
        /// (or cosmetics / hierarchy / choropleth / projection)
        #[arg(short, long, default_value = "cosmetics")]
        mode: MapMode,
        #[arg(short, long, default_value = "OrRd")]
        scheme: worldmap::colormap::ColorScheme,
        /// Plot raw density instead of ln(1 + density)
        #[arg(long)]
        linear: bool,
        /// Projection label or CRS identifier, e.g. "Robinson" or "ESRI:54030"
        #[arg(short, long, default_value = "EPSG:4326", value_parser = Projection::parse)]
        projection: Projection,
        /// Countries to highlight; repeat the flag for several
        #[arg(long = "highlight", value_name = "NAME")]
        highlights: Vec<String>,
        #[arg(short, long, value_name = "FILE", default_value = "map.png")]
        out: PathBuf,
    },
    /// Serve rendered maps over HTTP
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            config,
            mode,
            scheme,
            linear,
            projection,
            highlights,
            out,
        } => {
            let app_config = AppConfig::load_from_file(&config)?;
            let dataset = DatasetCache::from_config(&app_config);
            let fc = dataset.get_or_load()?;

            let request = MapRequest {
                mode,
                scheme,
                use_log: !linear,
                projection,
                highlights: if highlights.is_empty() {
                    default_highlights()
                } else {
                    highlights
                },
            };

            match render_view(fc, &request, &app_config.render) {
                View::Figure { title, image, .. } => {
                    let bytes = render::encode_png(&image)?;
                    std::fs::write(&out, bytes)
                        .with_context(|| format!("Failed to write {:?}", out))?;
                    println!("{} -> {}", title, out.display());
                }
                View::Message(message) => {
                    eprintln!("{}", message);
                    std::process::exit(1);
                }
            }
        }
        Commands::Serve { config } => {
            let app_config = AppConfig::load_from_file(&config)?;
            server::start_server(app_config).await?;
        }
    }

    Ok(())
}
