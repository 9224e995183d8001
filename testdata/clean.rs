// Owner-guarded counter with a checked withdrawal path.

#![cfg_attr(not(feature = "export-abi"), no_main)]
extern crate alloc;

use alloc::vec::Vec;
use stylus_sdk::{
    alloy_primitives::{Address, U256},
    call::transfer_eth,
    msg,
    prelude::*,
};

sol_storage! {
    #[entrypoint]
    pub struct Counter {
        uint256 number;
        address owner;
    }
}

#[public]
impl Counter {
    pub fn number(&self) -> U256 {
        self.number.get()
    }

    pub fn increment(&mut self) -> Result<(), Vec<u8>> {
        let next = self
            .number
            .get()
            .checked_add(U256::from(1))
            .ok_or_else(|| b"overflow".to_vec())?;
        self.number.set(next);
        Ok(())
    }

    pub fn withdraw(&mut self, to: Address, amount: U256) -> Result<(), Vec<u8>> {
        if msg::sender() != self.owner.get() || to == Address::ZERO {
            return Err(b"unauthorized".to_vec());
        }
        transfer_eth(to, amount)
    }
}
