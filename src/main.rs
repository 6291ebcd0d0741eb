use clap::Parser;
use latebound::{LoaderOptions, Runtime, Value};
use tracing::Level;

/// Resolve a dotted path or evaluate a code fragment, printing the result as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Dotted path (`math.pi`) or code (`lambda x: x * 2`)
    source: String,
    /// JSON object used as the lookup/evaluation context
    #[arg(long)]
    context: Option<String>,
    /// Name to extract after executing a block of statements
    #[arg(long)]
    target: Option<String>,
    /// Drop keyword arguments the resolved callable does not declare
    #[arg(long)]
    dynamic_args: bool,
    /// Call the result with this JSON array of positional arguments
    #[arg(long)]
    call: Option<String>,
    /// Keyword arguments (JSON object) for --call
    #[arg(long)]
    kwargs: Option<String>,
    /// Only resolve SOURCE as a dotted path, never evaluate it
    #[arg(long)]
    lookup: bool,
    /// With --lookup, print null instead of failing when unresolved
    #[arg(long)]
    lenient: bool,
    /// Extra module directory, searched after the working directory
    #[arg(long = "path", value_name = "DIR")]
    paths: Vec<String>,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_json(flag: &str, raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("Invalid JSON for --{flag}: {e}"))
}

fn run(args: &Args) -> Result<Value, String> {
    let options = args
        .paths
        .iter()
        .fold(LoaderOptions::from_env(), |opts, dir| opts.with_search_path(dir));
    let runtime = Runtime::new(options);

    let context = match &args.context {
        Some(raw) => Some(Value::from(parse_json("context", raw)?)),
        None => None,
    };

    let value = if args.lookup {
        runtime
            .get_value(&args.source, context.as_ref(), !args.lenient)
            .map_err(|e| e.to_string())?
            .unwrap_or_default()
    } else {
        runtime
            .eval(&args.source, context.as_ref(), args.dynamic_args, args.target.as_deref())
            .map_err(|e| e.to_string())?
    };

    if args.call.is_none() && args.kwargs.is_none() {
        return Ok(value);
    }
    let positional = match &args.call {
        Some(raw) => match Value::from(parse_json("call", raw)?) {
            Value::List(items) => items.read().clone(),
            other => vec![other],
        },
        None => Vec::new(),
    };
    let keywords = match &args.kwargs {
        Some(raw) => Value::from(parse_json("kwargs", raw)?)
            .entries()
            .ok_or("--kwargs must be a JSON object")?
            .into_iter()
            .collect(),
        None => Vec::new(),
    };
    value.call(positional, keywords).map_err(|e| e.to_string())
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Cannot render result: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
