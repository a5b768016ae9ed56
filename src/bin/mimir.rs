//! mimir - cached LLM calls from the command line
//!
//! Reads `~/.mimir/config.toml` and `~/.mimir/secrets.toml` (or
//! `OPENAI_API_KEY`) and runs one call through the cache.

use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use mimir::config::{Config, Secrets};
use mimir::invoice::{
    ExtractionMode, ExtractionOutcome, InvoiceExtractor, InvoiceService, InvoiceSource,
    MemoryLedger,
};
use mimir::{CallParams, InvocationRequest, MimirBuilder, ModelBackend, ModelRegistry, StreamPart};

/// Mimir CLI
#[derive(Parser)]
#[command(name = "mimir")]
#[command(version = mimir::PKG_VERSION)]
#[command(about = "Cached LLM calls")]
struct Args {
    /// Config file (default: ~/.mimir/config.toml, then /etc/mimir/config.toml)
    #[arg(short, long, env = "MIMIR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the cache key of a request
    Key {
        /// Model identifier
        model: String,
        /// Params as JSON (or omit to read from stdin)
        params: Option<String>,
    },

    /// Generate a complete response
    Generate {
        /// Prompt (or omit to read from stdin)
        prompt: Option<String>,
        #[command(flatten)]
        call: CallArgs,
    },

    /// Stream a response
    Stream {
        /// Prompt (or omit to read from stdin)
        prompt: Option<String>,
        #[command(flatten)]
        call: CallArgs,
    },

    /// Extract an invoice from PDF text or an image URL
    Invoice {
        /// File holding text extracted from a PDF
        #[arg(long, conflicts_with = "image", required_unless_present = "image")]
        pdf: Option<PathBuf>,
        /// URL of an invoice image
        #[arg(long)]
        image: Option<String>,
        /// Ask for free-text JSON instead of a tool call
        #[arg(long)]
        json_text: bool,
        /// Model alias (default: the configured default)
        #[arg(short, long)]
        model: Option<String>,
    },
}

#[derive(clap::Args)]
struct CallArgs {
    /// Model alias (default: the configured default)
    #[arg(short, long)]
    model: Option<String>,
    /// System prompt
    #[arg(short, long)]
    system: Option<String>,
    /// Sampling temperature
    #[arg(short, long)]
    temperature: Option<f32>,
}

impl CallArgs {
    fn params(&self, prompt: String) -> CallParams {
        let mut params = CallParams::prompt(prompt);
        if let Some(system) = &self.system {
            params = params.system(system.clone());
        }
        if let Some(t) = self.temperature {
            params = params.temperature(t);
        }
        params
    }

    fn resolve(&self, registry: &ModelRegistry) -> mimir::Result<Arc<dyn ModelBackend>> {
        registry.resolve(self.model.as_deref())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    // Commands that don't need a provider
    if let Command::Key { model, params } = args.command {
        let params = resolve_text(params, "key")?;
        let params: serde_json::Value = serde_json::from_str(&params)?;
        println!("{}", InvocationRequest::from_value(model, params).key());
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;
    let registry = MimirBuilder::from_config(&config, &secrets).build()?;

    match args.command {
        Command::Key { .. } => unreachable!("handled above"),

        Command::Generate { prompt, call } => {
            let prompt = resolve_text(prompt, "generate")?;
            let model = call.resolve(&registry)?;
            let result = model.generate(&call.params(prompt)).await?;
            if let Some(reasoning) = &result.reasoning {
                eprintln!("reasoning: {}", reasoning.trim());
            }
            println!("{}", result.text);
            if let Some(usage) = result.usage {
                eprintln!(
                    "tokens: {} prompt, {} completion",
                    usage.prompt_tokens, usage.completion_tokens
                );
            }
        }

        Command::Stream { prompt, call } => {
            let prompt = resolve_text(prompt, "stream")?;
            let model = call.resolve(&registry)?;
            let mut stream = model.stream(&call.params(prompt)).await?.stream;
            let mut stdout = io::stdout();
            while let Some(part) = stream.next().await {
                match part? {
                    StreamPart::TextDelta { delta } => {
                        write!(stdout, "{delta}")?;
                        stdout.flush()?;
                    }
                    StreamPart::Reasoning { delta } => eprint!("{delta}"),
                    StreamPart::Error { message } => eprintln!("\nerror: {message}"),
                    StreamPart::Finish { finish_reason, .. } => {
                        writeln!(stdout)?;
                        eprintln!("finish: {finish_reason:?}");
                    }
                    _ => {}
                }
            }
        }

        Command::Invoice {
            pdf,
            image,
            json_text,
            model,
        } => {
            let source = match (pdf, image) {
                (Some(path), _) => InvoiceSource::pdf(std::fs::read_to_string(path)?),
                (None, Some(url)) => InvoiceSource::image(url),
                (None, None) => return Err("invoice: pass --pdf or --image".into()),
            };
            let mode = if json_text {
                ExtractionMode::JsonText
            } else {
                ExtractionMode::StructuredTool
            };
            let extractor =
                InvoiceExtractor::new(registry.resolve(model.as_deref())?).with_mode(mode);
            let service = InvoiceService::new(extractor, Arc::new(MemoryLedger::new()));

            match service.process(&source).await? {
                ExtractionOutcome::NotInvoice(fields) => {
                    eprintln!("not an invoice");
                    println!("{}", serde_json::to_string_pretty(&fields)?);
                }
                ExtractionOutcome::Duplicate(existing) => {
                    eprintln!("duplicate invoice found");
                    println!("{}", serde_json::to_string_pretty(&existing)?);
                }
                ExtractionOutcome::Saved(invoice) => {
                    println!("{}", serde_json::to_string_pretty(&invoice)?);
                }
            }
        }
    }

    Ok(())
}

/// Resolve input text from a positional argument and/or piped stdin.
///
/// When both are present the argument comes first, separated by a blank line.
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_is_pipe = !io::stdin().is_terminal();
    let stdin_text = if stdin_is_pipe {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    } else {
        None
    };

    match (arg, stdin_text) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => {
            Err(format!("{command}: no input provided (pass text as argument or via stdin)").into())
        }
    }
}
