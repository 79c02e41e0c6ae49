use anyhow::{Context as _, Result};
use clap::Parser;
use shimmytmpl::{Context, Engine, EngineConfig};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Render a template file against a JSON or TOML data file.
#[derive(Debug, Parser)]
#[command(name = "shimmytmpl", version, about)]
struct Cli {
    /// Template source file.
    #[arg(short, long)]
    template: PathBuf,

    /// Data file; `.toml` files are read as TOML, anything else as JSON.
    #[arg(short, long)]
    data: PathBuf,

    /// Write the result here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Engine limits as TOML (`max_depth`, `max_steps`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `max_steps` from the config file.
    #[arg(long)]
    max_steps: Option<u64>,

    /// Override `max_depth` from the config file.
    #[arg(long)]
    max_depth: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = engine_config(&cli)?;
    let source = fs::read_to_string(&cli.template)
        .with_context(|| format!("reading template {}", cli.template.display()))?;
    let ctx = load_context(&cli.data)?;

    let engine = Engine::new().with_config(config);
    // Render fully before touching the output so a failed render never
    // leaves a truncated file behind.
    let rendered = engine
        .render(&source, &ctx)
        .with_context(|| format!("rendering {}", cli.template.display()))?;

    match &cli.output {
        Some(path) => {
            fs::write(path, rendered).with_context(|| format!("writing {}", path.display()))?;
            info!(output = %path.display(), "configuration file generated");
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn engine_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            EngineConfig::from_toml_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    if let Some(max_steps) = cli.max_steps {
        config.max_steps = Some(max_steps);
    }
    if let Some(max_depth) = cli.max_depth {
        config.max_depth = max_depth;
    }
    Ok(config)
}

fn load_context(path: &Path) -> Result<Context> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading data {}", path.display()))?;
    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    let ctx = if is_toml {
        toml::from_str(&text).with_context(|| format!("parsing TOML data {}", path.display()))?
    } else {
        serde_json::from_str::<serde_json::Value>(&text)
            .map(Context::from)
            .with_context(|| format!("parsing JSON data {}", path.display()))?
    };
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_json_and_toml_data() {
        let json = write_temp(".json", r#"{"Server": {"Port": 8080}}"#);
        let toml = write_temp(".toml", "[Server]\nPort = 8080\n");
        let expected = Context::record().with("Server", Context::record().with("Port", 8080));
        assert_eq!(load_context(json.path()).unwrap(), expected);
        assert_eq!(load_context(toml.path()).unwrap(), expected);
    }

    #[test]
    fn flags_override_config_file() {
        let config = write_temp(".toml", "max_depth = 4\nmax_steps = 10\n");
        let cli = Cli::parse_from([
            "shimmytmpl",
            "--template",
            "t.tmpl",
            "--data",
            "d.json",
            "--config",
            config.path().to_str().unwrap(),
            "--max-steps",
            "99",
        ]);
        let config = engine_config(&cli).unwrap();
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.max_steps, Some(99));
    }

    #[test]
    fn sample_engine_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/engine.toml");
        let cli = Cli::parse_from([
            "shimmytmpl",
            "-t",
            "t.tmpl",
            "-d",
            "d.json",
            "--config",
            path.to_str().unwrap(),
        ]);
        let config = engine_config(&cli).unwrap();
        assert_eq!(
            config,
            EngineConfig {
                max_depth: 32,
                max_steps: Some(100_000),
            }
        );
    }

    #[test]
    fn sample_template_renders_against_sample_data() {
        let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
        let source = fs::read_to_string(manifest.join("templates/config.tmpl")).unwrap();
        let ctx = load_context(&manifest.join("demos/config.json")).unwrap();
        let rendered = Engine::new().render(&source, &ctx).unwrap();
        assert!(rendered.starts_with("# MyApplication v1.0.0 (production)\n"), "{rendered}");
        assert!(rendered.contains("listen = \"localhost:8080\"\n"), "{rendered}");
        assert!(rendered.contains("  - monitoring\n"), "{rendered}");
        assert!(rendered.contains("debug = false\n"), "{rendered}");
    }
}
