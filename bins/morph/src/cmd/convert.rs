use std::io::Read;

use morph_api::{builtin, Shape, Value};
use morph_engine::{Configuration, Engine, EngineConfig, EngineError};

use crate::config::ConvertArgs;

const SCALARS: [&str; 4] = [builtin::BOOL, builtin::INT, builtin::FLOAT, builtin::STR];

fn item_shape(name: &str) -> Result<Shape, EngineError> {
    match name {
        "any" => Ok(Shape::Any),
        name if SCALARS.contains(&name) => Ok(Shape::ty(name)),
        other => Err(EngineError::Input(format!("unknown item type '{other}'"))),
    }
}

/// Destination shape from the `--to` / `--item` pair.
pub fn parse_target(to: &str, item: Option<&str>) -> Result<Shape, EngineError> {
    match (to, item) {
        (builtin::LIST, Some(item)) => Ok(Shape::list_of(item_shape(item)?)),
        (builtin::MAP, Some(item)) => Ok(Shape::map_of(item_shape(item)?)),
        (builtin::LIST | builtin::MAP, None) => Ok(Shape::ty(to)),
        (_, Some(_)) => Err(EngineError::Input(format!("--item needs a list or map destination, got '{to}'"))),
        (to, None) => item_shape(to),
    }
}

fn read_input(path: &str) -> Result<String, EngineError> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).map_err(|e| EngineError::Input(format!("{path}: {e}")))
}

pub fn run(args: ConvertArgs) -> Result<(), EngineError> {
    let config = match &args.config {
        Some(path) => {
            tracing::info!(config = %path, "loading configuration");
            EngineConfig::load(path)?
        }
        None => EngineConfig::default(),
    };
    let engine = Engine::bootstrap(config)?;
    let target = parse_target(&args.to, args.item.as_deref())?;

    let text = read_input(&args.input)?;
    let json: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| EngineError::Input(e.to_string()).with_context(&args.input))?;

    let settings = Configuration::new().user_option("strip_none", args.strip_none)?;
    tracing::info!(input = %args.input, to = %target, "converting");
    let out = engine.convert_with(&Value::from(json), target, &settings)?;

    let rendered = serde_json::to_string_pretty(&out).map_err(|e| EngineError::Input(e.to_string()))?;
    println!("{rendered}");
    Ok(())
}
