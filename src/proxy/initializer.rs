//! Encodes the initializer call a proxy runs in its constructor.

use super::Initializer;
use crate::error::DeployError;
use ethers::abi::token::{LenientTokenizer, Tokenizer};
use ethers::abi::{Abi, Function, ParamType, Token};
use ethers::types::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

/// Function called when [`Initializer::Default`] is selected.
pub const DEFAULT_INITIALIZER: &str = "initialize";

/// Builds the calldata passed as the proxy's `_data` constructor argument.
///
/// An empty result means no initializer is called. JSON `args` are converted to
/// ABI tokens using the selected function's parameter types: strings, numbers and
/// booleans are parsed leniently, arrays map to arrays, fixed arrays and tuples.
///
/// JSON numbers only carry integers up to 64 bits exactly; larger `uint256`/`int256`
/// values must be given as decimal or `0x` hex strings.
pub fn initializer_calldata(
    abi: &Abi,
    initializer: &Initializer,
    args: &[Value],
) -> Result<Bytes, DeployError> {
    let name = match initializer {
        Initializer::Skip => {
            if !args.is_empty() {
                warn!(count = args.len(), "Initializer skipped, ignoring arguments");
            }
            return Ok(Bytes::default());
        }
        Initializer::Default => {
            if args.is_empty() && abi.functions_by_name(DEFAULT_INITIALIZER).is_err() {
                debug!("No initialize function and no arguments, proxy left uninitialized");
                return Ok(Bytes::default());
            }
            DEFAULT_INITIALIZER
        }
        Initializer::Call(name) => name.as_str(),
    };

    let function = select_overload(abi, name, args.len())?;
    let tokens = function
        .inputs
        .iter()
        .zip(args)
        .map(|(param, value)| {
            tokenize(&param.kind, value).map_err(|e| {
                DeployError::Initializer(format!("{name}: argument `{}`: {e}", param.name))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let data = function
        .encode_input(&tokens)
        .map_err(|e| DeployError::Initializer(format!("{name}: {e}")))?;
    debug!(initializer = name, bytes = data.len(), "Initializer encoded");
    Ok(Bytes::from(data))
}

fn select_overload<'a>(abi: &'a Abi, name: &str, arity: usize) -> Result<&'a Function, DeployError> {
    let overloads = abi
        .functions_by_name(name)
        .map_err(|_| DeployError::Initializer(format!("contract has no function `{name}`")))?;

    let mut matching = overloads.iter().filter(|f| f.inputs.len() == arity);
    match (matching.next(), matching.next()) {
        (Some(function), None) => Ok(function),
        (None, _) => Err(DeployError::Initializer(format!(
            "no `{name}` overload takes {arity} argument(s)"
        ))),
        (Some(_), Some(_)) => Err(DeployError::Initializer(format!(
            "`{name}` has several overloads taking {arity} argument(s)"
        ))),
    }
}

fn tokenize(kind: &ParamType, value: &Value) -> Result<Token, String> {
    match (kind, value) {
        (ParamType::Array(inner), Value::Array(items)) => items
            .iter()
            .map(|item| tokenize(inner, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Token::Array),
        (ParamType::FixedArray(inner, len), Value::Array(items)) => {
            if items.len() != *len {
                return Err(format!("expected {len} elements, got {}", items.len()));
            }
            items
                .iter()
                .map(|item| tokenize(inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Token::FixedArray)
        }
        (ParamType::Tuple(kinds), Value::Array(items)) => {
            if items.len() != kinds.len() {
                return Err(format!("expected {} tuple fields, got {}", kinds.len(), items.len()));
            }
            kinds
                .iter()
                .zip(items)
                .map(|(kind, item)| tokenize(kind, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Token::Tuple)
        }
        (_, Value::String(s)) => tokenize_scalar(kind, s),
        (ParamType::Uint(_) | ParamType::Int(_), Value::Number(n)) if n.is_f64() => Err(format!(
            "{n} is not an exact integer, pass large values as a string"
        )),
        (_, Value::Number(n)) => tokenize_scalar(kind, &n.to_string()),
        (_, Value::Bool(b)) => tokenize_scalar(kind, &b.to_string()),
        (kind, other) => Err(format!("cannot encode {other} as {kind}")),
    }
}

fn tokenize_scalar(kind: &ParamType, raw: &str) -> Result<Token, String> {
    let raw = match kind {
        ParamType::Address | ParamType::Bytes | ParamType::FixedBytes(_) => {
            raw.strip_prefix("0x").unwrap_or(raw)
        }
        _ => raw,
    };
    LenientTokenizer::tokenize(kind, raw).map_err(|e| format!("cannot encode {raw:?} as {kind}: {e}"))
}
