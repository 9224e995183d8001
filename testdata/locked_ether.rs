// Piggy bank that accepts value and has no way to pay it back.

#![cfg_attr(not(feature = "export-abi"), no_main)]
extern crate alloc;

use alloc::vec::Vec;
use stylus_sdk::{alloy_primitives::U256, prelude::*};

#[storage]
#[entrypoint]
pub struct Piggy {
    balance: StorageU256,
    owner: StorageAddress,
}

#[public]
impl Piggy {
    #[payable]
    pub fn deposit(&mut self) -> Result<(), Vec<u8>> {
        let value = self.vm().msg_value();
        self.balance.set(self.balance.get() + value);
        Ok(())
    }

    pub fn balance(&self) -> U256 {
        self.balance.get()
    }
}
