//! The node event loop.
//!
//! Single-threaded host around the gossip engine, the same shape as any
//! poll(2) embedding: wait for the socket to become readable with the tick
//! countdown as the timeout, feed inbound datagrams to the engine, run the
//! tick, drain the outbound queue. Stdin commands arrive over a channel and
//! are executed between iterations, so the engine stays single-owner.

use anyhow::{bail, Context, Result};
use gossip_core::{Gossip, GossipError};
use std::net::SocketAddr;

use crate::config::NodeConfig;
use crate::repl::{self, Command};

pub fn run(config: &NodeConfig) -> Result<()> {
    let bind: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.bind))?;
    let seeds: Vec<SocketAddr> = config
        .seeds
        .iter()
        .map(|s| {
            s.parse()
                .with_context(|| format!("invalid seed address: {s}"))
        })
        .collect::<Result<_>>()?;

    let mut gossip = Gossip::new(
        bind,
        Some(Box::new(|payload: &[u8]| match std::str::from_utf8(payload) {
            Ok(text) => println!("<< {text}"),
            Err(_) => println!("<< [{} binary bytes]", payload.len()),
        })),
    )?;
    gossip.join(&seeds)?;
    // Get the HELLOs on the wire before the first poll sleep.
    gossip.process_send()?;

    let fd = gossip
        .socket_fd()
        .context("gossip engine exposes no socket descriptor")?;
    let commands = repl::spawn_stdin_reader();

    eprintln!(
        "gossipd on {} (uid {}) — commands: ls, ls -i, send <text>, stats, quit",
        gossip.self_member().addr,
        gossip.self_member().uid
    );

    let mut poll_timeout = gossip.tick()?;
    loop {
        let mut poll_fd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout = poll_timeout.min(i32::MAX as u64) as libc::c_int;
        let poll_result = unsafe { libc::poll(&mut poll_fd, 1, timeout) };

        if poll_result < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err).context("poll failed");
        }
        if poll_result > 0 {
            if poll_fd.revents & libc::POLLERR != 0 {
                bail!("gossip socket failure");
            }
            if poll_fd.revents & libc::POLLIN != 0 {
                match gossip.process_receive() {
                    Ok(()) => {}
                    // Stray or early datagrams are dropped by the engine;
                    // the loop keeps running.
                    Err(
                        GossipError::InvalidMessage
                        | GossipError::BufferNotEnough
                        | GossipError::BadState(_),
                    ) => {}
                    Err(err) => return Err(err).context("gossip receive failed"),
                }
            }
        }

        while let Ok(command) = commands.try_recv() {
            if execute(&mut gossip, command)? {
                gossip.destroy();
                return Ok(());
            }
        }

        poll_timeout = gossip.tick().context("gossip tick failed")?;

        if let Err(err) = gossip.process_send() {
            // A full socket buffer aborts the drain; the next iteration
            // retries with the queue intact.
            tracing::warn!(error = %err, "gossip send drain aborted");
        }
    }
}

/// Executes one stdin command. Returns true when the node should shut down.
fn execute(gossip: &mut Gossip, command: Command) -> Result<bool> {
    match command {
        Command::Ls => {
            for member in gossip.member_list() {
                println!("[*] {}", member.uid);
            }
        }
        Command::Addrs => {
            for member in gossip.member_list() {
                println!("[*] {}", member.addr);
            }
        }
        Command::Send(text) => match gossip.send_data(text.as_bytes()) {
            Ok(()) => {}
            Err(GossipError::BadState(state)) => {
                eprintln!("not connected yet (state {state:?})");
            }
            Err(GossipError::BufferNotEnough) => {
                eprintln!("payload too large for one message");
            }
            Err(err) => return Err(err).context("send_data failed"),
        },
        Command::Stats => {
            let snapshot = serde_json::json!({
                "state": format!("{:?}", gossip.state()),
                "uid": gossip.self_member().uid,
                "addr": gossip.self_member().addr.to_string(),
                "members": gossip.member_list().len(),
                "outbound": gossip.outbound_len(),
            });
            println!("{snapshot}");
        }
        Command::Quit => return Ok(true),
    }
    Ok(false)
}
