// Truncated contract that does not parse.

#[public]
impl Broken {
    pub fn withdraw(&mut self, amount: U256 -> Result<(), Vec<u8>> {
        let balance = self.balance.get().checked_sub(amount).unwrap();
        self.balance.set(balance
    }
