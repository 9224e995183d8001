// Vault that pays out to whatever recipient the caller names.

#![cfg_attr(not(feature = "export-abi"), no_main)]
extern crate alloc;

use alloc::vec::Vec;
use stylus_sdk::{
    alloy_primitives::{Address, U256},
    call::{transfer_eth, Call},
    msg,
    prelude::*,
};

sol_interface! {
    interface IErc20 {
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
    }
}

#[storage]
#[entrypoint]
pub struct Vault {
    balances: StorageMap<Address, StorageU256>,
    token: StorageAddress,
}

#[public]
impl Vault {
    pub fn withdraw_to(&mut self, to: Address, amount: U256) -> Result<(), Vec<u8>> {
        let balance = self.balances.get(msg::sender());
        if balance < amount {
            return Err(b"insufficient".to_vec());
        }
        self.balances.setter(msg::sender()).set(balance - amount);
        transfer_eth(to, amount)
    }

    pub fn withdraw_checked(&mut self, to: Address, amount: U256) -> Result<(), Vec<u8>> {
        if to == Address::ZERO {
            return Err(b"zero recipient".to_vec());
        }
        transfer_eth(to, amount)
    }

    pub fn pull(&mut self, from: Address, to: Address, amount: U256) -> Result<bool, Vec<u8>> {
        let token = IErc20::new(self.token.get());
        let moved = token.transfer_from(Call::new_in(self), from, to, amount)?;
        Ok(moved)
    }
}
