//! Issue and verify tokens from the command line.
//!
//! Loads `.env` automatically if present, otherwise reads from the environment.
//!
//! ```bash
//! cargo run --example token -- issue d45009dd-e45a-493e-b432-805235cf7d27
//! cargo run --example token -- verify eyJhbG...
//! cargo run --example token -- secret
//! ```

use jwt_authenticatable::Authenticator;
use tracing_subscriber::EnvFilter;

fn main() {
    // Load .env if present; silently ignore if absent.
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else { usage() };

    match command.as_str() {
        "secret" => {
            // Not a token: a fresh random HS256 key for JWT_SIGNER_KEY.
            let bytes: [u8; 32] = rand::random();
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            println!("{hex}");
        }
        "issue" => {
            let subject = args.get(1).unwrap_or_else(|| usage());
            match authenticator().issue_token(subject) {
                Ok(token) => println!("{token}"),
                Err(e) => fail(&e),
            }
        }
        "verify" => {
            let token = args.get(1).unwrap_or_else(|| usage());
            match authenticator().verify(token) {
                Ok(c) => {
                    println!("Valid\n");
                    println!("  sub : {}", c.subject());
                    println!("  iss : {}", c.issuer());
                    println!("  iat : {}", c.issued_at_secs());
                    println!("  exp : {}", c.expires_at());
                }
                Err(e) => fail(&e),
            }
        }
        _ => usage(),
    }
}

fn authenticator() -> Authenticator {
    Authenticator::from_env().unwrap_or_else(|e| {
        eprintln!("Hint: `cargo run --example token -- secret` prints a usable JWT_SIGNER_KEY");
        fail(&e)
    })
}

fn fail(e: &dyn std::fmt::Display) -> ! {
    eprintln!("Failed: {e}");
    std::process::exit(1);
}

fn usage() -> ! {
    eprintln!("Usage:");
    eprintln!("  cargo run --example token -- issue  <subject>");
    eprintln!("  cargo run --example token -- verify <token>");
    eprintln!("  cargo run --example token -- secret");
    std::process::exit(1);
}
