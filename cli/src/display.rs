//! Terminal output for wallets.

use std::fmt;

use vvcoin_protocol::identity::Keypair;

const MASKED_SECRET: &str = "nsec1*****";

/// What `vvc wallet` prints about one wallet.
pub struct WalletInfo<'a> {
    pub name: &'a str,
    pub balance: u64,
    pub keypair: &'a Keypair,
    pub show_secret: bool,
}

impl fmt::Display for WalletInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = if self.show_secret {
            self.keypair.to_nsec()
        } else {
            MASKED_SECRET.to_string()
        };
        writeln!(f, "Wallet Name: {}", self.name)?;
        writeln!(f, "Balance:     {}vvc", self.balance)?;
        writeln!(f, "Public Key:  {}", self.keypair.public_key().to_npub())?;
        write!(f, "Secret Key:  {}", secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_masked_unless_asked_for() {
        let keypair = Keypair::generate();
        let mut info = WalletInfo {
            name: "main",
            balance: 42,
            keypair: &keypair,
            show_secret: false,
        };
        let text = info.to_string();
        assert!(text.contains("Balance:     42vvc"));
        assert!(text.contains("npub1"));
        assert!(text.contains(MASKED_SECRET));
        assert!(!text.contains(&keypair.to_nsec()));

        info.show_secret = true;
        assert!(info.to_string().contains(&keypair.to_nsec()));
    }
}
