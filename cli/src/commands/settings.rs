//! Router credential helpers

use anyhow::Context;
use hub_netsync::{MasterKey, MASTER_KEY_ENV};
use std::io::{self, BufRead};

use super::Outcome;
use crate::SettingsCommands;

pub fn handle(action: SettingsCommands) -> anyhow::Result<Outcome> {
    match action {
        SettingsCommands::EncryptPassword => {
            let key = MasterKey::from_env()?
                .with_context(|| format!("{MASTER_KEY_ENV} is not set"))?;
            let mut password = String::new();
            io::stdin()
                .lock()
                .read_line(&mut password)
                .context("cannot read password from stdin")?;
            let password = password.trim_end_matches(['\r', '\n']);
            anyhow::ensure!(!password.is_empty(), "empty password");
            println!("{}", key.encrypt_string(password)?);
        }
        SettingsCommands::GenerateKey => {
            println!("{}", MasterKey::generate().to_base64());
            eprintln!("export it as {MASTER_KEY_ENV}; losing it makes stored passwords unreadable");
        }
    }
    Ok(Outcome::Success)
}
