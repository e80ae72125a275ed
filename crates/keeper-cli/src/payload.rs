//! Typed item payloads.
//!
//! The server stores an opaque blob plus a type tag. The client decides
//! what the blob holds: JSON for passwords and cards, raw UTF-8 for text,
//! raw bytes for binary files.

use std::io::{BufRead, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::client::{Item, Metadata};

/// The kinds of item this client knows how to build and show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ItemKind {
    Password,
    Text,
    Card,
    Binary,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Text => "text",
            Self::Card => "card",
            Self::Binary => "binary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPayload {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPayload {
    pub number: String,
    pub holder: String,
    pub expiry_month: String,
    pub expiry_year: String,
    pub cvv: String,
}

/// Payload fields given on the command line. Anything a kind needs but
/// that is missing here is prompted for on stdin.
#[derive(Debug, Clone, Default, Args)]
pub struct PayloadArgs {
    /// Login stored in a password item.
    #[arg(long)]
    pub user: Option<String>,
    /// Password stored in a password item.
    #[arg(long)]
    pub pass: Option<String>,
    /// Body of a text item. Read from stdin until EOF when omitted.
    #[arg(long)]
    pub text: Option<String>,
    /// Card number.
    #[arg(long)]
    pub number: Option<String>,
    /// Card holder name.
    #[arg(long)]
    pub holder: Option<String>,
    #[arg(long)]
    pub expiry_month: Option<String>,
    #[arg(long)]
    pub expiry_year: Option<String>,
    #[arg(long)]
    pub cvv: Option<String>,
    /// File whose bytes become a binary item.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Cleartext tag, repeatable.
    #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_meta)]
    pub meta: Vec<Metadata>,
}

/// Parse a `key=value` metadata tag.
pub fn parse_meta(raw: &str) -> Result<Metadata, String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok(Metadata {
            key: key.trim().to_owned(),
            value: value.to_owned(),
        }),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

/// Reads answers to prompts. Prompts go to `output` so piped stdout stays
/// clean.
pub struct Prompter<'a> {
    input: &'a mut dyn BufRead,
    output: &'a mut dyn Write,
    terminal: bool,
}

impl<'a> Prompter<'a> {
    pub fn new(input: &'a mut dyn BufRead, output: &'a mut dyn Write) -> Self {
        Self {
            input,
            output,
            terminal: false,
        }
    }

    /// Read secrets from the controlling terminal with echo off instead of
    /// from `input`.
    #[must_use]
    pub fn on_terminal(mut self, terminal: bool) -> Self {
        self.terminal = terminal;
        self
    }

    /// Return `given` or ask for one line.
    pub fn value(&mut self, given: Option<&str>, label: &str) -> Result<String> {
        if let Some(v) = given {
            return Ok(v.to_owned());
        }
        write!(self.output, "{label}: ")?;
        self.output.flush()?;
        let mut line = String::new();
        let read = self.input.read_line(&mut line)?;
        if read == 0 {
            bail!("{label}: no input");
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_owned())
    }

    /// Like [`Prompter::value`], but the answer is not echoed.
    pub fn secret(&mut self, given: Option<&str>, label: &str) -> Result<String> {
        if let Some(v) = given {
            return Ok(v.to_owned());
        }
        if self.terminal {
            return rpassword::prompt_password(format!("{label}: "))
                .with_context(|| format!("{label}: no input"));
        }
        write!(self.output, "{label}: ")?;
        self.output.flush()?;
        rpassword::read_password_from_bufread(&mut self.input)
            .with_context(|| format!("{label}: no input"))
    }

    fn rest(&mut self, label: &str) -> Result<String> {
        writeln!(self.output, "{label} (end with EOF):")?;
        self.output.flush()?;
        let mut text = String::new();
        self.input.read_to_string(&mut text)?;
        Ok(text.trim_end_matches(['\r', '\n']).to_owned())
    }
}

/// Build the plaintext payload for an item of `kind`.
///
/// # Errors
///
/// Fails if a prompt hits EOF or a binary file cannot be read.
pub fn build(kind: ItemKind, args: &PayloadArgs, prompt: &mut Prompter<'_>) -> Result<Vec<u8>> {
    let data = match kind {
        ItemKind::Password => serde_json::to_vec(&PasswordPayload {
            login: prompt.value(args.user.as_deref(), "Login")?,
            password: prompt.secret(args.pass.as_deref(), "Password")?,
        })?,
        ItemKind::Text => match &args.text {
            Some(text) => text.clone().into_bytes(),
            None => prompt.rest("Text")?.into_bytes(),
        },
        ItemKind::Card => serde_json::to_vec(&CardPayload {
            number: prompt.value(args.number.as_deref(), "Number")?,
            holder: prompt.value(args.holder.as_deref(), "Holder")?,
            expiry_month: prompt.value(args.expiry_month.as_deref(), "Expiry month")?,
            expiry_year: prompt.value(args.expiry_year.as_deref(), "Expiry year")?,
            cvv: prompt.secret(args.cvv.as_deref(), "CVV")?,
        })?,
        ItemKind::Binary => {
            let path = match &args.file {
                Some(path) => path.clone(),
                None => PathBuf::from(prompt.value(None, "File path")?),
            };
            std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?
        }
    };
    Ok(data)
}

/// Print a decrypted item. Binary payloads are written to `out` when given,
/// otherwise to a file named after the item in the working directory.
///
/// # Errors
///
/// Fails if a structured payload does not parse, the file cannot be
/// written, or the item name is not usable as a plain file name.
pub fn render(item: &Item, out: Option<&Path>, w: &mut dyn Write) -> Result<()> {
    writeln!(w, "Name: {}", item.name)?;
    writeln!(w, "Type: {}", item.kind)?;
    if item.metadata.is_empty() {
        writeln!(w, "Metadata: empty")?;
    } else {
        writeln!(w, "Metadata:")?;
        for m in &item.metadata {
            writeln!(w, "\t{}: {}", m.key, m.value)?;
        }
    }

    match item.kind.as_str() {
        "password" => {
            let p: PasswordPayload =
                serde_json::from_slice(&item.data).context("malformed password payload")?;
            writeln!(w, "Login: {}", p.login)?;
            writeln!(w, "Password: {}", p.password)?;
        }
        "card" => {
            let c: CardPayload =
                serde_json::from_slice(&item.data).context("malformed card payload")?;
            writeln!(w, "Number: {}", c.number)?;
            writeln!(w, "Holder: {}", c.holder)?;
            writeln!(w, "Expires: {}/{}", c.expiry_month, c.expiry_year)?;
            writeln!(w, "CVV: {}", c.cvv)?;
        }
        "binary" => {
            let path = match out {
                Some(path) => path.to_path_buf(),
                None => default_file_name(&item.name)?,
            };
            std::fs::write(&path, &item.data)
                .with_context(|| format!("failed to write {}", path.display()))?;
            writeln!(w, "File saved to {} ({} bytes)", path.display(), item.data.len())?;
        }
        _ => {
            writeln!(w, "Text: {}", String::from_utf8_lossy(&item.data))?;
        }
    }
    Ok(())
}

/// The name comes from the server, so it may only name a file in the
/// working directory.
fn default_file_name(name: &str) -> Result<PathBuf> {
    let mut parts = Path::new(name).components();
    match (parts.next(), parts.next()) {
        (Some(Component::Normal(file)), None) => Ok(PathBuf::from(file)),
        _ => bail!("item name '{name}' is not a plain file name, pass --out"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn item(kind: &str, data: &[u8]) -> Item {
        Item {
            name: "entry".into(),
            kind: kind.into(),
            data: data.to_vec(),
            metadata: vec![Metadata {
                key: "site".into(),
                value: "example.com".into(),
            }],
        }
    }

    #[test]
    fn meta_needs_a_key() {
        let m = parse_meta("site=a=b").unwrap();
        assert_eq!(m.key, "site");
        assert_eq!(m.value, "a=b");
        assert!(parse_meta("novalue").is_err());
        assert!(parse_meta("=x").is_err());
    }

    #[test]
    fn password_prompts_for_missing_fields() {
        let mut input = Cursor::new(b"hunter2\n".to_vec());
        let mut output = Vec::new();
        let args = PayloadArgs {
            user: Some("alice".into()),
            ..PayloadArgs::default()
        };

        let data = build(
            ItemKind::Password,
            &args,
            &mut Prompter::new(&mut input, &mut output),
        )
        .unwrap();

        let p: PasswordPayload = serde_json::from_slice(&data).unwrap();
        assert_eq!(p.login, "alice");
        assert_eq!(p.password, "hunter2");
        assert_eq!(String::from_utf8(output).unwrap(), "Password: ");
    }

    #[test]
    fn text_reads_until_eof() {
        let mut input = Cursor::new(b"line one\nline two\n".to_vec());
        let mut output = Vec::new();
        let data = build(
            ItemKind::Text,
            &PayloadArgs::default(),
            &mut Prompter::new(&mut input, &mut output),
        )
        .unwrap();
        assert_eq!(data, b"line one\nline two");
    }

    #[test]
    fn prompt_at_eof_fails() {
        let mut input = Cursor::new(Vec::new());
        let mut output = Vec::new();
        let err = build(
            ItemKind::Card,
            &PayloadArgs::default(),
            &mut Prompter::new(&mut input, &mut output),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Number"));
    }

    #[test]
    fn render_card() {
        let card = serde_json::to_vec(&CardPayload {
            number: "4111111111111111".into(),
            holder: "A HOLDER".into(),
            expiry_month: "04".into(),
            expiry_year: "29".into(),
            cvv: "123".into(),
        })
        .unwrap();
        let mut out = Vec::new();
        render(&item("card", &card), None, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Expires: 04/29"));
        assert!(out.contains("\tsite: example.com"));
    }

    #[test]
    fn render_binary_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let mut out = Vec::new();
        render(&item("binary", &[0, 1, 2]), Some(&path), &mut out).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn secrets_are_read_without_echo() {
        let mut input = Cursor::new(b"4111\nA HOLDER\n04\n29\n123\n".to_vec());
        let mut output = Vec::new();
        let data = build(
            ItemKind::Card,
            &PayloadArgs::default(),
            &mut Prompter::new(&mut input, &mut output),
        )
        .unwrap();

        let c: CardPayload = serde_json::from_slice(&data).unwrap();
        assert_eq!(c.cvv, "123");
        let prompts = String::from_utf8(output).unwrap();
        assert!(prompts.ends_with("CVV: "));
        assert!(!prompts.contains("123"));
    }

    #[test]
    fn secret_prefers_given_value() {
        let mut input = Cursor::new(Vec::new());
        let mut output = Vec::new();
        let mut prompt = Prompter::new(&mut input, &mut output);
        assert_eq!(prompt.secret(Some("s3cret"), "Secret").unwrap(), "s3cret");
        let err = prompt.secret(None, "Secret").unwrap_err();
        assert!(err.to_string().contains("Secret"));
    }

    #[test]
    fn binary_name_cannot_leave_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let escape = dir.path().join("outside").join("..").join("stolen");
        for name in [escape.to_str().unwrap(), "../stolen", "a/b", ".", ""] {
            let mut blob = item("binary", b"payload");
            blob.name = name.to_owned();
            let mut out = Vec::new();
            let err = render(&blob, None, &mut out).unwrap_err();
            assert!(err.to_string().contains("--out"), "{name}");
        }
        assert!(!dir.path().join("stolen").exists());
    }

    #[test]
    fn plain_binary_name_is_accepted() {
        assert_eq!(default_file_name("blob.bin").unwrap(), PathBuf::from("blob.bin"));
    }

    #[test]
    fn unknown_kind_renders_as_text() {
        let mut out = Vec::new();
        render(&item("note", b"hello"), None, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("Text: hello"));
    }
}
