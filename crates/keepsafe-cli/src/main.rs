//! Keepsafe CLI - manage an encrypted credential vault from the terminal
//!
//! The master password is prompted for, or taken from `KEEPSAFE_PASSWORD`
//! for scripted use.

use std::error::Error;
use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::info;

use keepsafe_core::password::{generate_with, CharsetOptions, DEFAULT_GENERATED_LENGTH};
use keepsafe_core::{Field, KeyState, SecretString, Vault};

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Keepsafe - encrypted credential store
#[derive(Parser, Debug)]
#[command(name = "keepsafe")]
#[command(version)]
#[command(about = "Keepsafe - store website credentials encrypted under a master password")]
struct Args {
    /// Vault directory (defaults to the per-user data directory)
    #[arg(long, env = "KEEPSAFE_DIR")]
    dir: Option<PathBuf>,

    /// Master password (prompted for when absent)
    #[arg(long, env = "KEEPSAFE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set the master password of a new vault
    Init,
    /// Check a master password without changing anything
    UnlockCheck,
    /// Add a credential
    Add(CredentialArgs),
    /// Show one credential
    Show {
        name: String,
        /// Print the password instead of masking it
        #[arg(long)]
        reveal: bool,
    },
    /// List stored credentials
    List,
    /// Replace email, password and website of a credential
    Update(CredentialArgs),
    /// Remove a credential
    Remove { name: String },
    /// Change the master password and re-encrypt every credential
    ChangeMaster {
        /// New master password (prompted for when absent)
        #[arg(long, env = "KEEPSAFE_NEW_PASSWORD", hide_env_values = true)]
        new_password: Option<String>,
    },
    /// Print a random password
    Generate(GenerateArgs),
    /// Rate the strength of a password
    Check,
}

#[derive(ClapArgs, Debug)]
struct CredentialArgs {
    name: String,
    #[arg(long, default_value = "")]
    email: String,
    #[arg(long, default_value = "")]
    website: String,
    /// Generate the password instead of prompting, optionally with a length
    #[arg(long, value_name = "LENGTH", num_args = 0..=1, default_missing_value = "12")]
    generate: Option<usize>,
}

#[derive(ClapArgs, Debug)]
struct GenerateArgs {
    #[arg(long, short, default_value_t = DEFAULT_GENERATED_LENGTH)]
    length: usize,
    #[arg(long)]
    no_uppercase: bool,
    #[arg(long)]
    no_lowercase: bool,
    #[arg(long)]
    no_digits: bool,
    #[arg(long)]
    no_punctuation: bool,
}

impl GenerateArgs {
    fn charsets(&self) -> CharsetOptions {
        CharsetOptions {
            uppercase: !self.no_uppercase,
            lowercase: !self.no_lowercase,
            digits: !self.no_digits,
            punctuation: !self.no_punctuation,
        }
    }
}

fn main() -> CliResult<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Needs no vault
    if let Command::Generate(options) = &args.command {
        println!("{}", generate_with(options.length, options.charsets())?);
        return Ok(());
    }

    let mut vault = match &args.dir {
        Some(dir) => Vault::open(dir),
        None => Vault::open_default(),
    }
    .map_err(|e| format!("Failed to open vault: {}", e))?;

    let master = args.password.as_deref();

    match args.command {
        Command::Init => {
            if vault.has_master_password()? {
                return Err("Vault already has a master password; use change-master".into());
            }
            let password = new_secret(master, "New master password: ")?;
            vault.initialize_password(password.expose())?;
            println!("Vault initialized");
        }
        Command::UnlockCheck => {
            if !vault.has_master_password()? {
                return Err("No master password set. Run `keepsafe init` first.".into());
            }
            let password = read_secret(master, "Master password: ")?;
            if vault.check_password(password.expose())? {
                println!("Password OK");
            } else {
                return Err("Incorrect master password".into());
            }
        }
        Command::Add(credential) => {
            unlock(&mut vault, master)?;
            let password = credential_password(&credential)?;
            vault.add_credential(
                &credential.name,
                &credential.email,
                password.expose(),
                &credential.website,
            )?;
            println!("Added {}", credential.name);
        }
        Command::Show { name, reveal } => {
            unlock(&mut vault, master)?;
            let record = vault
                .credential(&name)?
                .ok_or_else(|| format!("No credential named '{}'", name))?;
            for field in Field::ALL {
                let value = match field.text(&record) {
                    Some(text) => text.to_string(),
                    None if field.capabilities().private && !reveal => "********".to_string(),
                    None => match vault.reveal_password(&name)? {
                        Some(secret) => secret.expose().to_string(),
                        None => "<unable to decrypt>".to_string(),
                    },
                };
                println!("{:>10}: {}", field.label(), value);
            }
        }
        Command::List => {
            unlock(&mut vault, master)?;
            let records = vault.credentials()?;
            if records.is_empty() {
                println!("No credentials stored");
            }
            for record in records {
                println!("{}\t{}\t{}", record.name, record.email, record.website);
            }
        }
        Command::Update(credential) => {
            unlock(&mut vault, master)?;
            let password = credential_password(&credential)?;
            vault.update_credential(
                &credential.name,
                &credential.email,
                password.expose(),
                &credential.website,
            )?;
            println!("Updated {}", credential.name);
        }
        Command::Remove { name } => {
            unlock(&mut vault, master)?;
            vault.delete_credential(&name)?;
            println!("Removed {}", name);
        }
        Command::ChangeMaster { new_password } => {
            unlock(&mut vault, master)?;
            let password = new_secret(new_password.as_deref(), "New master password: ")?;
            let total = vault.change_password(password.expose())?;
            println!("Master password changed, {} credential(s) re-encrypted", total);
        }
        Command::Check => {
            let password = read_secret(None, "Password to check: ")?;
            let strength = vault.strength(password.expose())?;
            let weak = vault.is_weak_password(password.expose())?;
            println!("Strength: {}", strength);
            if weak {
                println!("This password is weak");
            }
        }
        Command::Generate(_) => {}
    }

    Ok(())
}

/// Use `given` or prompt without echo
fn read_secret(given: Option<&str>, prompt: &str) -> CliResult<SecretString> {
    match given {
        Some(value) => Ok(SecretString::new(value.to_string())),
        None => Ok(SecretString::new(rpassword::prompt_password(prompt)?)),
    }
}

/// Like [`read_secret`], but a prompted value must be typed twice
fn new_secret(given: Option<&str>, prompt: &str) -> CliResult<SecretString> {
    if given.is_some() {
        return read_secret(given, prompt);
    }
    let first = read_secret(None, prompt)?;
    let second = read_secret(None, "Repeat: ")?;
    if first.expose() != second.expose() {
        return Err("Passwords do not match".into());
    }
    Ok(first)
}

fn credential_password(credential: &CredentialArgs) -> CliResult<SecretString> {
    match credential.generate {
        Some(length) => {
            let generated = generate_with(length, CharsetOptions::all())?;
            println!("Generated password: {}", generated);
            Ok(SecretString::new(generated))
        }
        None => read_secret(None, &format!("Password for {}: ", credential.name)),
    }
}

fn unlock(vault: &mut Vault, master: Option<&str>) -> CliResult<()> {
    match vault.state()? {
        KeyState::Unset => return Err("No master password set. Run `keepsafe init` first.".into()),
        KeyState::Unlocked => return Ok(()),
        KeyState::Locked => {}
    }
    let password = read_secret(master, "Master password: ")?;
    if !vault.unlock(password.expose())? {
        return Err("Incorrect master password".into());
    }
    info!("Vault unlocked");
    Ok(())
}
