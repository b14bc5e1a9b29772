use std::str::FromStr;

use alloy::dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::{Address, Bytes, U256};
use serde_json::Value;

use message_saver_core::{AbiPort, ContractFunction, ContractMessage, PortError, QueryResult};

/// Interface of the deployed `MessageStorage` contract. The EVM path only
/// binds the first four entries.
pub const MESSAGE_STORAGE_ABI: &str = r#"[
  {
    "type": "function",
    "name": "storeMessage",
    "inputs": [{ "internalType": "string", "name": "_content", "type": "string" }],
    "outputs": [],
    "stateMutability": "nonpayable"
  },
  {
    "type": "function",
    "name": "getMessageCount",
    "inputs": [],
    "outputs": [{ "internalType": "uint256", "name": "", "type": "uint256" }],
    "stateMutability": "view"
  },
  {
    "type": "function",
    "name": "getMessage",
    "inputs": [{ "internalType": "uint256", "name": "_messageId", "type": "uint256" }],
    "outputs": [
      { "internalType": "address", "name": "sender", "type": "address" },
      { "internalType": "string", "name": "content", "type": "string" },
      { "internalType": "uint256", "name": "timestamp", "type": "uint256" },
      { "internalType": "uint256", "name": "id", "type": "uint256" }
    ],
    "stateMutability": "view"
  },
  {
    "type": "function",
    "name": "getRecentMessages",
    "inputs": [{ "internalType": "uint256", "name": "_count", "type": "uint256" }],
    "outputs": [
      { "internalType": "address[]", "name": "senders", "type": "address[]" },
      { "internalType": "string[]", "name": "contents", "type": "string[]" },
      { "internalType": "uint256[]", "name": "timestamps", "type": "uint256[]" },
      { "internalType": "uint256[]", "name": "ids", "type": "uint256[]" }
    ],
    "stateMutability": "view"
  },
  {
    "type": "function",
    "name": "getUserMessages",
    "inputs": [{ "internalType": "address", "name": "_user", "type": "address" }],
    "outputs": [{ "internalType": "uint256[]", "name": "", "type": "uint256[]" }],
    "stateMutability": "view"
  },
  {
    "type": "function",
    "name": "getUserMessageCount",
    "inputs": [{ "internalType": "address", "name": "_user", "type": "address" }],
    "outputs": [{ "internalType": "uint256", "name": "", "type": "uint256" }],
    "stateMutability": "view"
  }
]"#;

#[derive(Debug, Clone)]
pub struct MessageAbiAdapter {
    abi: JsonAbi,
}

impl MessageAbiAdapter {
    pub fn new() -> Result<Self, PortError> {
        let abi = serde_json::from_str(MESSAGE_STORAGE_ABI)
            .map_err(|e| PortError::Validation(format!("invalid message storage abi: {e}")))?;
        Ok(Self { abi })
    }

    fn function(&self, function: ContractFunction) -> Result<&Function, PortError> {
        self.abi
            .function(function.abi_name())
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| PortError::NotFound(format!("abi has no function {function}")))
    }
}

impl AbiPort for MessageAbiAdapter {
    fn encode_call(&self, function: ContractFunction, args: &[Value]) -> Result<Bytes, PortError> {
        let abi_fn = self.function(function)?;
        if abi_fn.inputs.len() != args.len() {
            return Err(PortError::Validation(format!(
                "{function}: expected {} argument(s), got {}",
                abi_fn.inputs.len(),
                args.len()
            )));
        }
        let mut values = Vec::with_capacity(args.len());
        for (input, arg) in abi_fn.inputs.iter().zip(args) {
            let ty: DynSolType = input.ty.parse().map_err(|e| {
                PortError::Validation(format!("unsupported type '{}': {e}", input.ty))
            })?;
            let value = parse_dyn_value(arg, &ty).map_err(|e| {
                PortError::Validation(format!("{function} argument '{}': {e}", input.name))
            })?;
            values.push(value);
        }
        let encoded = abi_fn
            .abi_encode_input(&values)
            .map_err(|e| PortError::Validation(format!("abi encoding failed: {e}")))?;
        Ok(Bytes::from(encoded))
    }

    fn decode_output(&self, function: ContractFunction, data: &[u8]) -> Result<QueryResult, PortError> {
        let abi_fn = self.function(function)?;
        let values = abi_fn
            .abi_decode_output(data, true)
            .map_err(|e| PortError::Validation(format!("abi decoding failed: {e}")))?;
        shape_output(function, &values).map_err(PortError::Validation)
    }
}

fn parse_dyn_value(value: &Value, ty: &DynSolType) -> Result<DynSolValue, String> {
    match ty {
        DynSolType::Uint(bits) => {
            let raw = match value {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.clone(),
                _ => return Err("expected uint string/number".to_owned()),
            };
            let parsed = match raw.strip_prefix("0x") {
                Some(hex) => U256::from_str_radix(hex, 16),
                None => U256::from_str(&raw),
            };
            parsed
                .map(|x| DynSolValue::Uint(x, *bits))
                .map_err(|e| format!("invalid uint: {e}"))
        }
        DynSolType::Address => value
            .as_str()
            .ok_or_else(|| "expected address string".to_owned())
            .and_then(|s| {
                Address::from_str(s)
                    .map(DynSolValue::Address)
                    .map_err(|e| format!("invalid address: {e}"))
            }),
        DynSolType::String => value
            .as_str()
            .map(|s| DynSolValue::String(s.to_owned()))
            .ok_or_else(|| "expected string".to_owned()),
        other => Err(format!("argument type {other} is not used by the message contract")),
    }
}

fn shape_output(function: ContractFunction, values: &[DynSolValue]) -> Result<QueryResult, String> {
    match function {
        ContractFunction::StoreMessage => Err("storeMessage has no return value".to_owned()),
        ContractFunction::GetMessageCount | ContractFunction::GetUserMessageCount => {
            let [count] = values else {
                return Err(format!("expected 1 output, got {}", values.len()));
            };
            Ok(QueryResult::Count(uint_field(count, "count")?))
        }
        ContractFunction::GetMessage => {
            let [sender, content, timestamp, id] = values else {
                return Err(format!("expected 4 outputs, got {}", values.len()));
            };
            Ok(QueryResult::Message(ContractMessage {
                id: uint_field(id, "id")?,
                sender: address_field(sender)?,
                content: string_field(content)?,
                timestamp: uint_field(timestamp, "timestamp")?,
            }))
        }
        ContractFunction::GetRecentMessages => {
            let [senders, contents, timestamps, ids] = values else {
                return Err(format!("expected 4 outputs, got {}", values.len()));
            };
            let senders = array_field(senders, "senders")?;
            let contents = array_field(contents, "contents")?;
            let timestamps = array_field(timestamps, "timestamps")?;
            let ids = array_field(ids, "ids")?;

            let mut messages = Vec::with_capacity(senders.len());
            for (index, sender) in senders.iter().enumerate() {
                let row = |column: &[DynSolValue], name: &str| {
                    column
                        .get(index)
                        .cloned()
                        .ok_or_else(|| format!("{name} has no row {index}"))
                };
                messages.push(ContractMessage {
                    id: uint_field(&row(ids, "ids")?, "id")?,
                    sender: address_field(sender)?,
                    content: string_field(&row(contents, "contents")?)?,
                    timestamp: uint_field(&row(timestamps, "timestamps")?, "timestamp")?,
                });
            }
            Ok(QueryResult::Messages(messages))
        }
        ContractFunction::GetUserMessages => {
            let [ids] = values else {
                return Err(format!("expected 1 output, got {}", values.len()));
            };
            let ids = array_field(ids, "ids")?
                .iter()
                .map(|id| uint_field(id, "id"))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(QueryResult::Ids(ids))
        }
    }
}

fn uint_field(value: &DynSolValue, name: &str) -> Result<u64, String> {
    let (raw, _) = value
        .as_uint()
        .ok_or_else(|| format!("{name}: expected uint"))?;
    if raw > U256::from(u64::MAX) {
        return Err(format!("{name}: {raw} does not fit in u64"));
    }
    Ok(raw.as_limbs()[0])
}

fn address_field(value: &DynSolValue) -> Result<String, String> {
    value
        .as_address()
        .map(|address| address.to_string())
        .ok_or_else(|| "sender: expected address".to_owned())
}

fn string_field(value: &DynSolValue) -> Result<String, String> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| "content: expected string".to_owned())
}

fn array_field<'a>(value: &'a DynSolValue, name: &str) -> Result<&'a [DynSolValue], String> {
    value
        .as_array()
        .ok_or_else(|| format!("{name}: expected array"))
}
