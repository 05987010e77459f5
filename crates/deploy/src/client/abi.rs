//! ABI encoding of constructor and initializer arguments.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, keccak256},
};

use crate::plan::Literal;

/// Solidity type of a literal, as used in function signatures.
pub fn sol_type(literal: &Literal) -> &'static str {
    match literal {
        Literal::Address(_) => "address",
        Literal::Uint(_) => "uint256",
        Literal::Bool(_) => "bool",
        Literal::String(_) => "string",
    }
}

fn sol_value(literal: &Literal) -> DynSolValue {
    match literal {
        Literal::Address(address) => DynSolValue::Address(*address),
        Literal::Uint(value) => DynSolValue::Uint(*value, 256),
        Literal::Bool(value) => DynSolValue::Bool(*value),
        Literal::String(value) => DynSolValue::String(value.clone()),
    }
}

/// Encode `args` as a parameter list, the form appended to creation
/// bytecode for a constructor call.
pub fn encode_params(args: &[Literal]) -> Vec<u8> {
    if args.is_empty() {
        return Vec::new();
    }
    DynSolValue::Tuple(args.iter().map(sol_value).collect()).abi_encode_params()
}

/// Signature of the `initialize` function taking `args`, e.g.
/// `initialize(address)`.
pub fn initializer_signature(args: &[Literal]) -> String {
    let types: Vec<&str> = args.iter().map(sol_type).collect();
    format!("initialize({})", types.join(","))
}

/// First four bytes of the keccak hash of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Calldata of `initialize(args)`.
pub fn encode_initializer_call(args: &[Literal]) -> Vec<u8> {
    let mut calldata = selector(&initializer_signature(args)).to_vec();
    calldata.extend(encode_params(args));
    calldata
}

/// Constructor arguments of an OpenZeppelin v5 `TransparentUpgradeableProxy`:
/// `(address logic, address initialOwner, bytes data)`.
pub fn encode_proxy_constructor(logic: Address, owner: Address, init_data: Vec<u8>) -> Vec<u8> {
    DynSolValue::Tuple(vec![
        DynSolValue::Address(logic),
        DynSolValue::Address(owner),
        DynSolValue::Bytes(init_data),
    ])
    .abi_encode_params()
}
