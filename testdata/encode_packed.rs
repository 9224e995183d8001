// Registry that derives keys from packed encodings.

#![cfg_attr(not(feature = "export-abi"), no_main)]
extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use alloy_sol_types::{
    sol_data::{Address as SOLAddress, String as SOLString, Uint},
    SolType,
};
use stylus_sdk::{
    alloy_primitives::{keccak256, Address, U256},
    prelude::*,
};

#[storage]
#[entrypoint]
pub struct Registry;

#[public]
impl Registry {
    pub fn key_for(&self, a: String, b: String) -> [u8; 32] {
        let packed = [a.as_bytes(), b.as_bytes()].concat();
        keccak256(packed).into()
    }

    pub fn packed_names(&self, a: String, b: String) -> Vec<u8> {
        type PackedNames = (SOLString, SOLString);
        let values = (a, b);
        PackedNames::abi_encode_packed(&values)
    }

    pub fn delimited(&self, a: String, b: String) -> Vec<u8> {
        let delimiter = [0u8];
        [a.as_bytes(), &delimiter, b.as_bytes()].concat()
    }

    pub fn fixed(&self, owner: Address, amount: U256) -> Vec<u8> {
        type FixedPacked = (SOLAddress, Uint<256>);
        let values = (owner, amount);
        FixedPacked::abi_encode_packed(&values)
    }
}
