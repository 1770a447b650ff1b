//! dapi-gen - offline DAPI schema tool
//!
//! Validates a schema and prints what the protocol derives from it: codes,
//! the record layout of every codec role and the blocking call signature.

use std::fmt::Write as _;
use std::fs;

use anyhow::{Context, Result, bail};
use dapi_ipc::views::MultipleReturns;
use dapi_ipc::{Arg, ArgType, Code, Protocol, RecordLayout, Role};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "Usage: dapi-gen [--json] [SCHEMA]";

#[derive(Debug, Serialize)]
struct FunctionReport<'a> {
    name: &'a str,
    command_code: Code,
    reply_code: Code,
    call: CallSignature<'a>,
    layouts: Vec<LayoutReport<'a>>,
}

#[derive(Debug, Serialize)]
struct CallSignature<'a> {
    inputs: Vec<&'a Arg>,
    /// `None` means the call only reports success
    returns: Option<&'a ArgType>,
}

#[derive(Debug, Serialize)]
struct LayoutReport<'a> {
    role: Role,
    size: usize,
    #[serde(flatten)]
    layout: &'a RecordLayout,
}

fn report(protocol: &Protocol) -> Result<Vec<FunctionReport<'_>>, MultipleReturns> {
    protocol
        .operations()
        .map(|op| {
            let function = op.function();
            Ok(FunctionReport {
                name: op.name(),
                command_code: op.command_code,
                reply_code: op.reply_code,
                call: CallSignature {
                    inputs: Role::HighLevelCall.view(function)?,
                    returns: function.return_arg().map(|arg| &arg.ty),
                },
                layouts: Role::CODEC
                    .iter()
                    .map(|&role| {
                        let layout = op.layout(role);
                        LayoutReport {
                            role,
                            size: layout.size(),
                            layout,
                        }
                    })
                    .collect(),
            })
        })
        .collect()
}

fn render_text(reports: &[FunctionReport<'_>]) -> String {
    let mut out = String::new();
    for function in reports {
        let inputs: Vec<String> = function
            .call
            .inputs
            .iter()
            .map(|arg| format!("{}: {}", arg.name, arg.ty.spelling()))
            .collect();
        let returns = function.call.returns.map_or("bool", ArgType::spelling);

        // Writing to a String cannot fail
        let _ = writeln!(
            out,
            "{} (command {}, reply {})",
            function.name, function.command_code, function.reply_code
        );
        let _ = writeln!(out, "  call: {}({}) -> {}", function.name, inputs.join(", "), returns);
        for layout in &function.layouts {
            let fields: Vec<String> = layout
                .layout
                .fields
                .iter()
                .map(|field| format!("{}: {} [{:?}]", field.name, field.ty.spelling(), field.slot))
                .collect();
            let _ = writeln!(
                out,
                "  {:?}: {} bytes {{ {} }}",
                layout.role,
                layout.size,
                fields.join(", ")
            );
        }
    }
    out
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "dapi_gen=info,warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut json = false;
    let mut path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--json" => json = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            _ if path.is_none() => path = Some(arg),
            _ => bail!("Unexpected argument `{}`\n{}", arg, USAGE),
        }
    }

    let protocol = match &path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read schema {}", path))?;
            Protocol::parse(&text).with_context(|| format!("Invalid schema {}", path))?
        }
        None => Protocol::builtin().context("Invalid built-in schema")?,
    };
    debug!("Derived {} functions", protocol.len());

    let reports = report(&protocol).context("Invalid call signature")?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).context("Failed to serialize report")?
        );
    } else {
        print!("{}", render_text(&reports));
    }
    Ok(())
}
