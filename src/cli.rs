//! Command-line interface (spec section 6.1).

use std::io::BufRead;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use crate::selection_list::MAX;

/// Longest line we accept from stdin ingestion.
const MAX_STDIN_LINE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Hotkey {
    F1,
    F2,
    F5,
}

#[derive(Debug, Parser)]
#[command(
    name = "multiselect",
    version,
    about = "Own the PRIMARY selection and offer a menu of captured strings instead of a single paste buffer."
)]
pub struct Cli {
    /// Stay resident after serving a request instead of exiting.
    #[arg(short = 'd', long = "daemon")]
    pub daemon: bool,

    /// Grab a hotkey that opens the menu without a pasting client. May be
    /// given more than once.
    #[arg(short = 'k', long = "hotkey", value_enum)]
    pub hotkeys: Vec<Hotkey>,

    /// Fabricate a selection request when the menu was opened via hotkey,
    /// so picking an entry pastes it even with no waiting requestor.
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// Keep capturing the PRIMARY selection from whoever else owns it after
    /// losing ownership, instead of exiting.
    #[arg(short = 'c', long = "continuous")]
    pub continuous: bool,

    /// Paste as soon as the cursor moves, without requiring Return.
    #[arg(short = 'i', long = "immediate")]
    pub immediate: bool,

    /// Byte that splits each entry into a displayed label and a sent
    /// payload (the payload is everything after the first occurrence).
    #[arg(short = 't', long = "separator")]
    pub separator: Option<char>,

    /// Paste mode: send the selection directly on pick, without faking a
    /// middle-click.
    #[arg(short = 'p', long = "paste")]
    pub paste_mode: bool,

    /// External helper program consulted before falling back to a normal
    /// X selection send.
    #[arg(short = 'e', long = "helper")]
    pub external_helper: Option<String>,

    /// Either `-` (read newline-separated strings from stdin) or up to 20
    /// literal strings.
    #[arg(trailing_var_arg = true, required = true)]
    pub strings: Vec<String>,
}

/// Flags derived from the raw CLI, used throughout the rest of the program
/// (spec section 3, `ModeFlags`).
#[derive(Debug, Clone, Copy)]
pub struct ModeFlags {
    pub daemon: bool,
    pub continuous: bool,
    pub immediate: bool,
    pub click: bool,
    pub force: bool,
    pub hotkey_f1: bool,
    pub hotkey_f2: bool,
    pub hotkey_f5: bool,
}

impl ModeFlags {
    pub fn from_cli(cli: &Cli) -> Self {
        let hotkey_f1 = cli.force || cli.hotkeys.contains(&Hotkey::F1);
        let hotkey_f2 = cli.hotkeys.contains(&Hotkey::F2);
        let hotkey_f5 = cli.hotkeys.contains(&Hotkey::F5);
        let daemon =
            cli.daemon || cli.continuous || cli.force || hotkey_f1 || hotkey_f2 || hotkey_f5;
        ModeFlags {
            daemon,
            continuous: cli.continuous,
            immediate: cli.immediate,
            click: !cli.paste_mode,
            force: cli.force,
            hotkey_f1,
            hotkey_f2,
            hotkey_f5,
        }
    }
}

/// Turns the positional arguments into the initial list of strings,
/// reading stdin line-by-line when the sole positional is `-`.
pub fn ingest_strings(strings: &[String]) -> Result<Vec<String>> {
    if strings == ["-".to_string()] {
        return ingest_stdin(std::io::stdin().lock());
    }
    Ok(strings.iter().take(MAX).cloned().collect())
}

fn ingest_stdin(reader: impl BufRead) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for line in reader.lines() {
        if out.len() >= MAX {
            break;
        }
        let mut line = line?;
        line.truncate(MAX_STDIN_LINE);
        out.push(line);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn stdin_ingestion_stops_at_max() {
        let input = (0..30).map(|i| format!("line{i}\n")).collect::<String>();
        let out = ingest_stdin(Cursor::new(input)).unwrap();
        assert_eq!(out.len(), MAX);
        assert_eq!(out[0], "line0");
    }

    #[test]
    fn stdin_lines_truncated_to_500_bytes() {
        let long_line = "x".repeat(1000) + "\n";
        let out = ingest_stdin(Cursor::new(long_line)).unwrap();
        assert_eq!(out[0].len(), MAX_STDIN_LINE);
    }

    #[test]
    fn mode_flags_force_implies_daemon_and_f1() {
        let cli = Cli {
            daemon: false,
            hotkeys: vec![],
            force: true,
            continuous: false,
            immediate: false,
            separator: None,
            paste_mode: false,
            external_helper: None,
            strings: vec!["a".into()],
        };
        let flags = ModeFlags::from_cli(&cli);
        assert!(flags.daemon);
        assert!(flags.hotkey_f1);
    }

    #[test]
    fn mode_flags_continuous_implies_daemon() {
        let cli = Cli {
            daemon: false,
            hotkeys: vec![],
            force: false,
            continuous: true,
            immediate: false,
            separator: None,
            paste_mode: false,
            external_helper: None,
            strings: vec!["a".into()],
        };
        let flags = ModeFlags::from_cli(&cli);
        assert!(flags.daemon);
        assert!(flags.continuous);
    }
}
