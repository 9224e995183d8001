// Payout contract that drops transfer results on the floor.

#![cfg_attr(not(feature = "export-abi"), no_main)]
extern crate alloc;

use alloc::vec::Vec;
use stylus_sdk::{
    alloy_primitives::{Address, U256},
    call::{self, transfer_eth, Call},
    prelude::*,
};

sol_interface! {
    interface IErc20 {
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

#[storage]
#[entrypoint]
pub struct Payout {
    treasury: StorageAddress,
    token: StorageAddress,
}

#[public]
impl Payout {
    pub fn sweep(&mut self, amount: U256) -> Result<(), Vec<u8>> {
        let treasury = self.treasury.get();
        transfer_eth(treasury, amount);
        Ok(())
    }

    pub fn pay_token(&mut self, amount: U256) -> Result<(), Vec<u8>> {
        let token = IErc20::new(self.token.get());
        let treasury = self.treasury.get();
        let _ = token.transfer(Call::new_in(self), treasury, amount);
        Ok(())
    }

    pub fn ping(&mut self, target: Address) -> Result<(), Vec<u8>> {
        if target == Address::ZERO {
            return Err(b"zero target".to_vec());
        }
        call::call(Call::new_in(self), target, &[]);
        Ok(())
    }

    pub fn sweep_checked(&mut self, amount: U256) -> Result<(), Vec<u8>> {
        let treasury = self.treasury.get();
        transfer_eth(treasury, amount)?;
        Ok(())
    }
}
