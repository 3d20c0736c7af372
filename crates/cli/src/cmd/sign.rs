use std::path::Path;

use anyhow::{Context, Result};
use argp::FromArgs;
use code_checker_github::webhook::signature_header;
use typed_path::Utf8NativePathBuf;

use crate::util::native_path;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Print the X-Hub-Signature-256 value for a payload file, for replaying deliveries.
#[argp(subcommand, name = "sign")]
pub struct Args {
    #[argp(option, short = 's')]
    /// webhook secret (default: $WEBHOOK_SECRET)
    secret: Option<String>,
    #[argp(positional, from_str_fn(native_path))]
    /// payload file
    payload: Utf8NativePathBuf,
}

pub fn run(args: Args) -> Result<i32> {
    let secret = match args.secret {
        Some(secret) => secret,
        None => std::env::var("WEBHOOK_SECRET")
            .context("No --secret given and WEBHOOK_SECRET is unset")?,
    };
    println!("{}", sign_file(args.payload.with_platform_encoding(), &secret)?);
    Ok(0)
}

fn sign_file(path: impl AsRef<Path>, secret: &str) -> Result<String> {
    let path = path.as_ref();
    let payload =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(signature_header(&payload, secret.as_bytes()))
}
