//! Add a mail account to the sync database

use anyhow::Context;
use mailsync_rs::storage::MessageStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 5 {
        eprintln!("Usage: {} <host> <port> <username> <password>", args[0]);
        eprintln!("Example: {} imap.example.com 993 sales@example.com secret", args[0]);
        std::process::exit(1);
    }

    let host = &args[1];
    let port: u16 = args[2].parse().context("invalid port")?;
    let username = &args[3];
    let password = &args[4];

    println!("Adding account: {}@{}:{}", username, host, port);

    let store = MessageStore::new("sqlite://crm.db?mode=rwc").await?;
    let id = store.add_account(host, port, username, password).await?;

    println!("✅ Account added successfully");
    println!("   Id: {}", id);
    println!("   Host: {}:{}", host, port);

    Ok(())
}
