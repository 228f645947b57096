use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    process::{Child, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn binary_relays_between_clients() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("chat_relay");

    let (mut server, mut server_stdout) = spawn_server(binary, "127.0.0.1:0").await?;
    let addr = read_server_addr(&mut server_stdout).await?;

    // Drain additional server logs in the background so the pipe never fills.
    let log_task = tokio::spawn(async move {
        drain_stdout(server_stdout).await;
    });

    let mut alice = BufReader::new(TcpStream::connect(&addr).await?);
    read_exact_text(&mut alice, "Please enter a username ").await?;
    alice.write_all(b"alice\r\n").await?;
    read_exact_text(&mut alice, "Welcome, alice\n").await?;

    let mut bob = BufReader::new(TcpStream::connect(&addr).await?);
    read_exact_text(&mut bob, "Please enter a username ").await?;
    bob.write_all(b"bob\r\n").await?;
    read_exact_text(&mut bob, "Welcome, bob\n").await?;

    let joined = read_line(&mut alice).await?;
    assert!(
        joined.starts_with("[bob][") && joined.ends_with("]: joined \n"),
        "unexpected join notice {joined:?}"
    );

    // A bare newline survives framing, so the relayed line ends with one too.
    bob.write_all(b"hello alice\n").await?;
    let relayed = read_line(&mut alice).await?;
    assert!(
        relayed.starts_with("[bob][") && relayed.ends_with("]: hello alice\n"),
        "unexpected relayed line {relayed:?}"
    );

    drop(bob);
    let left = read_line(&mut alice).await?;
    assert!(
        left.starts_with("[bob][") && left.contains("]: left at "),
        "unexpected leave notice {left:?}"
    );

    let _ = server.kill().await;
    let _ = server.wait().await;
    let _ = log_task.await;

    Ok(())
}

#[tokio::test]
async fn wrong_argument_count_prints_usage_and_fails() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("chat_relay");

    for args in [&[][..], &["5000", "6000"][..]] {
        let output = Command::new(binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("failed to run chat_relay")?;

        assert!(!output.status.success(), "args {args:?} should fail");
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("Usage"), "missing usage in {stderr:?}");
    }

    Ok(())
}

#[tokio::test]
async fn bind_failure_is_fatal() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("chat_relay");
    let occupied = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = occupied.local_addr()?.to_string();

    let output = timeout(
        READ_TIMEOUT,
        Command::new(binary)
            .arg(&addr)
            .env("RUST_LOG_STYLE", "never")
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output(),
    )
    .await
    .map_err(|_| anyhow!("server did not exit on bind failure"))??;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to listen on"), "unexpected stderr {stderr:?}");
    Ok(())
}

async fn spawn_server(binary: &Path, listen: &str) -> Result<(Child, BufReader<ChildStdout>)> {
    let mut cmd = Command::new(binary);
    cmd.arg(listen)
        .env("RUST_LOG_STYLE", "never")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("failed to spawn server")?;
    let stdout = child
        .stdout
        .take()
        .context("server stdout missing after spawn")?;

    Ok((child, BufReader::new(stdout)))
}

async fn read_server_addr(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    loop {
        let mut line = String::new();
        let bytes = timeout(READ_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| anyhow!("timed out waiting for listening banner"))??;
        if bytes == 0 {
            return Err(anyhow!("server exited before printing its address"));
        }
        if !line.contains("listening on") {
            continue;
        }
        let addr = line
            .split_whitespace()
            .last()
            .context("unexpected server banner format")?;
        if !addr.contains(':') {
            return Err(anyhow!("server banner missing socket: {}", line.trim()));
        }
        return Ok(addr.to_string());
    }
}

async fn read_exact_text(stream: &mut BufReader<TcpStream>, expected: &str) -> Result<()> {
    let mut buf = vec![0u8; expected.len()];
    timeout(READ_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .map_err(|_| anyhow!("timed out waiting for {expected:?}"))??;
    assert_eq!(String::from_utf8_lossy(&buf), expected);
    Ok(())
}

async fn read_line(stream: &mut BufReader<TcpStream>) -> Result<String> {
    let mut line = String::new();
    let bytes = timeout(READ_TIMEOUT, stream.read_line(&mut line))
        .await
        .map_err(|_| anyhow!("timed out waiting for line"))??;
    if bytes == 0 {
        return Err(anyhow!("stream closed"));
    }
    Ok(line)
}

async fn drain_stdout(mut reader: BufReader<ChildStdout>) {
    let mut buffer = String::new();
    while reader
        .read_line(&mut buffer)
        .await
        .map(|bytes| {
            let has_data = bytes > 0;
            if has_data {
                buffer.clear();
            }
            has_data
        })
        .unwrap_or(false)
    {}
}
