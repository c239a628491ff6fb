//! Simulated tag reader for a running rfid-authd.
//!
//! Run with: cargo run --example tag_client -- [ADDR] [UID] [SECRET]
//!
//! Defaults to 127.0.0.1:7400, tag C59B3706 and secret "MiEjemplo".
//!
//! Rounds:
//! 1. system.ping - Health check
//! 2. nonce.issue + tag.verify by UID
//! 3. nonce.issue + tag.verify by the alias handed back in round 2
//! 4. Replay of round 3 (expect SESSION_INVALID)
//! 5. Wrong secret (expect HMAC_INVALID)
//! 6. audit.logs for the tag

use std::env;
use std::io::{Read, Write};
use std::net::TcpStream;

use rfid_authd::auth::TagMac;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let addr = args.get(1).map(String::as_str).unwrap_or("127.0.0.1:7400");
    let uid = args.get(2).map(String::as_str).unwrap_or("C59B3706");
    let secret = args
        .get(3)
        .map(String::as_str)
        .unwrap_or("MiEjemplo")
        .as_bytes();

    println!("=== rfid-authd tag client ({}) ===\n", addr);
    let mut stream = TcpStream::connect(addr)?;

    println!("Round 1: system.ping");
    let response = send_request(&mut stream, "system.ping", serde_json::json!({}))?;
    println!("Response: {}\n", serde_json::to_string_pretty(&response)?);

    println!("Round 2: authenticate by UID {}", uid);
    let (verdict, _) = authenticate(&mut stream, uid, secret)?;
    println!("Verdict: {}\n", verdict);

    let alias = match verdict["alias"].as_str() {
        Some(alias) => alias.to_string(),
        None => {
            println!("No alias issued, stopping here.");
            return Ok(());
        }
    };

    println!("Round 3: authenticate by alias {}", alias);
    let (verdict, replay) = authenticate(&mut stream, &alias, secret)?;
    println!("Verdict: {}\n", verdict);

    println!("Round 4: replay round 3");
    let response = send_request(&mut stream, "tag.verify", replay)?;
    println!("Verdict: {}\n", response["data"]);

    println!("Round 5: wrong secret");
    let (verdict, _) = authenticate(&mut stream, uid, b"not-the-secret")?;
    println!("Verdict: {}\n", verdict);

    println!("Round 6: audit.logs");
    let response = send_request(
        &mut stream,
        "audit.logs",
        serde_json::json!({ "uid": uid, "limit": 10 }),
    )?;
    println!("Response: {}\n", serde_json::to_string_pretty(&response)?);

    println!("=== Done ===");
    Ok(())
}

/// One challenge-response round. Returns the verdict and the verify params so
/// the caller can replay them.
fn authenticate(
    stream: &mut TcpStream,
    identifier: &str,
    secret: &[u8],
) -> Result<(serde_json::Value, serde_json::Value), Box<dyn std::error::Error>> {
    let response = send_request(
        stream,
        "nonce.issue",
        serde_json::json!({ "identifier": identifier }),
    )?;
    if response["success"] != true {
        return Err(format!("nonce.issue failed: {}", response["error"]).into());
    }
    let session_id = response["data"]["sessionId"].as_str().unwrap_or_default();
    let nonce = hex::decode(response["data"]["nonce"].as_str().unwrap_or_default())?;

    let mac = TagMac::new(secret).sign(&hex::decode(identifier)?, &nonce);
    let params = serde_json::json!({
        "identifier": identifier,
        "sessionId": session_id,
        "hmac": hex::encode(mac),
    });

    let response = send_request(stream, "tag.verify", params.clone())?;
    Ok((response["data"].clone(), params))
}

fn send_request(
    stream: &mut TcpStream,
    command: &str,
    params: serde_json::Value,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let request = serde_json::json!({
        "command": command,
        "params": params,
    });
    let request_bytes = serde_json::to_vec(&request)?;

    // Send length-prefixed message
    let len_bytes = (request_bytes.len() as u32).to_be_bytes();
    stream.write_all(&len_bytes)?;
    stream.write_all(&request_bytes)?;
    stream.flush()?;

    // Read response length
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let response_len = u32::from_be_bytes(len_buf) as usize;

    let mut response_buf = vec![0u8; response_len];
    stream.read_exact(&mut response_buf)?;

    Ok(serde_json::from_slice(&response_buf)?)
}
