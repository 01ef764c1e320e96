//! Stdin command interface.
//!
//! A dedicated thread reads lines from stdin, parses them into commands, and
//! hands them to the event loop over a bounded channel. The engine itself is
//! only ever touched by the event-loop thread.

use crossbeam_channel::{bounded, Receiver};
use std::io::BufRead;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List known member uids.
    Ls,
    /// List known member addresses.
    Addrs,
    /// Broadcast a payload to the cluster.
    Send(String),
    /// Print a one-line JSON snapshot of the engine.
    Stats,
    Quit,
}

pub fn parse(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    let mut parts = trimmed.split_whitespace();
    match parts.next()? {
        "ls" => match parts.next() {
            None => Some(Command::Ls),
            Some("-i") => Some(Command::Addrs),
            Some(_) => None,
        },
        "addrs" => Some(Command::Addrs),
        "send" => {
            let text = trimmed.strip_prefix("send")?.trim_start();
            if text.is_empty() {
                None
            } else {
                Some(Command::Send(text.to_string()))
            }
        }
        "stats" => Some(Command::Stats),
        "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

/// Spawns the stdin reader thread and returns its command channel. The
/// thread exits on stdin EOF or after forwarding `quit`.
pub fn spawn_stdin_reader() -> Receiver<Command> {
    let (tx, rx) = bounded::<Command>(16);

    std::thread::Builder::new()
        .name("repl-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse(&line) {
                    Some(command) => {
                        let quit = command == Command::Quit;
                        if tx.send(command).is_err() || quit {
                            break;
                        }
                    }
                    None => eprintln!("unknown command — try: ls, ls -i, send <text>, stats, quit"),
                }
            }
        })
        .expect("failed to spawn stdin reader");

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse("ls"), Some(Command::Ls));
        assert_eq!(parse("  ls -i "), Some(Command::Addrs));
        assert_eq!(parse("addrs"), Some(Command::Addrs));
        assert_eq!(
            parse("send hello cluster"),
            Some(Command::Send("hello cluster".into()))
        );
        assert_eq!(parse("stats"), Some(Command::Stats));
        assert_eq!(parse("quit"), Some(Command::Quit));
        assert_eq!(parse("exit"), Some(Command::Quit));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse("ls --wat"), None);
        assert_eq!(parse("send"), None);
        assert_eq!(parse("send   "), None);
        assert_eq!(parse("frobnicate"), None);
    }
}
