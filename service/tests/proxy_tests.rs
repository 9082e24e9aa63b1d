//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! End-to-end tests of the proxy over loopback sockets

use mudproxy_service::{ProxyConfig, ProxyServer};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const WILL_ECHO: &[u8] = &[255, 251, 1];
const WONT_ECHO: &[u8] = &[255, 252, 1];

fn position(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    position(haystack, needle).is_some()
}

/// Read until `needle` has been seen, returning everything read
async fn read_until(stream: &mut TcpStream, needle: &[u8]) -> Vec<u8> {
    let needle_text = String::from_utf8_lossy(needle).into_owned();
    let mut seen = Vec::new();
    let mut buf = [0u8; 1024];
    timeout(WAIT, async {
        while !contains(&seen, needle) {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(
                n > 0,
                "connection closed before {needle_text:?}; got {:?}",
                String::from_utf8_lossy(&seen)
            );
            seen.extend_from_slice(&buf[..n]);
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {needle_text:?}"));
    seen
}

async fn read_to_close(stream: &mut TcpStream) -> Vec<u8> {
    let mut rest = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut rest))
        .await
        .expect("timed out waiting for close")
        .unwrap();
    rest
}

async fn start_proxy(mud: SocketAddr) -> ProxyServer {
    start_proxy_with(mud, |config| config).await
}

async fn start_proxy_with(
    mud: SocketAddr,
    configure: impl FnOnce(ProxyConfig) -> ProxyConfig,
) -> ProxyServer {
    let config = configure(
        ProxyConfig::new("127.0.0.1:0".parse().unwrap())
            .with_mud("127.0.0.1", mud.port())
            .with_password("secret")
            .with_shutdown_timeout(Duration::from_secs(2)),
    );
    let server = ProxyServer::new(config).await.unwrap();
    server.start().unwrap();
    server
}

async fn login(server: &ProxyServer) -> TcpStream {
    login_as(server, b"secret\r\n", b"Logged in.").await
}

async fn login_as(server: &ProxyServer, password: &[u8], welcome: &[u8]) -> TcpStream {
    let mut client = TcpStream::connect(server.bind_address()).await.unwrap();
    read_until(&mut client, WILL_ECHO).await;
    client.write_all(password).await.unwrap();
    read_until(&mut client, welcome).await;
    client
}

#[tokio::test]
async fn test_lines_flow_both_ways() {
    let fake_mud = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = start_proxy(fake_mud.local_addr().unwrap()).await;

    let mut client = login(&server).await;
    let (mut mud, _) = timeout(WAIT, fake_mud.accept()).await.unwrap().unwrap();

    client.write_all(b"look|say hi||there\r\n").await.unwrap();
    let received = read_until(&mut mud, b"say hi|there\r\n").await;
    assert_eq!(received, b"look\r\nsay hi|there\r\n");

    mud.write_all(b"A dragon sleeps here.\r\nHP: 100> \xff\xf9").await.unwrap();
    let output = read_until(&mut client, b"HP: 100> \xff\xf9").await;
    assert!(contains(&output, b"A dragon sleeps here.\r\n"));
    assert!(contains(&output, b"HP: 100> \xff\xf9"));

    let snapshot = server.snapshot();
    assert_eq!(snapshot.clients, 1);
    assert_eq!(snapshot.logged_in, 1);
    assert!(snapshot.mud_connected);

    server.shutdown().await.unwrap();
    let rest = read_to_close(&mut client).await;
    assert!(contains(&rest, b"The proxy is shutting down."));
}

#[tokio::test]
async fn test_repeated_failures_ban_the_address() {
    let fake_mud = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = start_proxy(fake_mud.local_addr().unwrap()).await;

    let mut client = TcpStream::connect(server.bind_address()).await.unwrap();
    read_until(&mut client, b"Password: ").await;
    for _ in 0..3 {
        client.write_all(b"guess\r\n").await.unwrap();
        read_until(&mut client, b"Incorrect password.").await;
    }
    client.write_all(b"guess\r\n").await.unwrap();
    let rest = read_to_close(&mut client).await;
    assert!(contains(&rest, b"You have been banned."));
    assert!(server.proxy().bans().is_banned("127.0.0.1".parse().unwrap()));

    let mut again = TcpStream::connect(server.bind_address()).await.unwrap();
    let refusal = read_to_close(&mut again).await;
    assert!(contains(&refusal, b"You are banned from this proxy."));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_mud_output_waits_for_login() {
    let fake_mud = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = start_proxy(fake_mud.local_addr().unwrap()).await;

    let mut watcher = login(&server).await;
    let (mut mud, _) = timeout(WAIT, fake_mud.accept()).await.unwrap().unwrap();
    let mut guest = TcpStream::connect(server.bind_address()).await.unwrap();
    read_until(&mut guest, b"Password: ").await;

    mud.write_all(b"Secret treasure.\r\n").await.unwrap();
    read_until(&mut watcher, b"Secret treasure.").await;

    guest.write_all(b"secret\r\n").await.unwrap();
    let after_login = read_until(&mut guest, b"Logged in.").await;
    assert!(!contains(&after_login, b"Secret treasure."));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_password_is_not_echoed() {
    let fake_mud = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = start_proxy(fake_mud.local_addr().unwrap()).await;

    let mut client = TcpStream::connect(server.bind_address()).await.unwrap();
    let greeting = read_until(&mut client, WILL_ECHO).await;
    let prompt = position(&greeting, b"Password: ").unwrap();
    assert!(prompt < position(&greeting, WILL_ECHO).unwrap());
    assert!(!contains(&greeting, WONT_ECHO));

    client.write_all(b"secret\r\n").await.unwrap();
    let after_login = read_until(&mut client, b"Logged in.").await;
    let wont = position(&after_login, WONT_ECHO).unwrap();
    assert!(wont < position(&after_login, b"Logged in.").unwrap());
    assert!(!contains(&after_login, WILL_ECHO));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_mud_output_keeps_command_order() {
    let fake_mud = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = start_proxy(fake_mud.local_addr().unwrap()).await;

    let mut client = login(&server).await;
    let (mut mud, _) = timeout(WAIT, fake_mud.accept()).await.unwrap().unwrap();

    mud.write_all(&[97, 98, 99, 255, 251, 1, 100, 101, 102, 13, 10])
        .await
        .unwrap();
    let output = read_until(&mut client, b"def\r\n").await;
    assert!(contains(&output, &[97, 98, 99, 255, 251, 1, 100, 101, 102, 13, 10]));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_commands_echo_to_other_players_only() {
    let fake_mud = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = start_proxy_with(fake_mud.local_addr().unwrap(), |config| {
        config
            .with_view_password(Some("watch".to_string()))
            .with_command_echo(true)
    })
    .await;

    let mut player = login(&server).await;
    let (mut mud, _) = timeout(WAIT, fake_mud.accept()).await.unwrap().unwrap();
    let mut partner = login(&server).await;
    let mut viewer = login_as(&server, b"watch\r\n", b"Logged in as view-only.").await;

    player.write_all(b"kill rat\r\n").await.unwrap();
    read_until(&mut mud, b"kill rat\r\n").await;
    read_until(&mut partner, b"kill rat").await;

    mud.write_all(b"The rat dies.\r\n").await.unwrap();
    let seen = read_until(&mut viewer, b"The rat dies.").await;
    assert!(!contains(&seen, b"kill rat"));
    let own = read_until(&mut player, b"The rat dies.").await;
    assert!(!contains(&own, b"kill rat"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_mud_hangup_is_announced() {
    let fake_mud = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = start_proxy(fake_mud.local_addr().unwrap()).await;

    let mut client = login(&server).await;
    let (mud, _) = timeout(WAIT, fake_mud.accept()).await.unwrap().unwrap();
    drop(mud);

    read_until(&mut client, b"Lost connection to the mud.").await;
    assert!(!server.proxy().mud().is_connected());
    assert!(!server.snapshot().mud_connected);

    client.write_all(b"look\r\n").await.unwrap();
    read_until(&mut client, b"Not connected to the mud.").await;

    server.shutdown().await.unwrap();
}
