// Vault that aborts instead of returning errors.

#![cfg_attr(not(feature = "export-abi"), no_main)]
extern crate alloc;

use alloc::vec::Vec;
use stylus_sdk::{alloy_primitives::U256, msg, prelude::*};

#[storage]
#[entrypoint]
pub struct Vault {
    balances: StorageMap<Address, StorageU256>,
    limit: StorageU256,
}

#[public]
impl Vault {
    pub fn withdraw(&mut self, amount: U256) -> Result<(), Vec<u8>> {
        let balance = self.balances.get(msg::sender());
        if balance < amount {
            panic!("insufficient balance");
        }
        let remaining = balance.checked_sub(amount).unwrap();
        self.balances.setter(msg::sender()).set(remaining);
        Ok(())
    }

    pub fn limit(&self) -> u64 {
        u64::try_from(self.limit.get()).expect("limit fits in u64")
    }
}
