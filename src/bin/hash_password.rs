//! Prints an Argon2id PHC string for a `[[users.entries]]` settings block.
//!
//! $ cargo run --bin hash_password -- --password 'correct horse battery'

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHasher};
use clap::Parser;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    password: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(args.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e))?;
    println!("{}", hash);
    Ok(())
}
