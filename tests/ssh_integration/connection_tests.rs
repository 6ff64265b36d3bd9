//! SSH connection tests against the Docker server

use hostlink::config::{ConnectionConfig, HostKeyPolicy};
use hostlink::error::SshError;
use hostlink::ssh::RemoteSession;
use secrecy::SecretString;

use super::fixtures::SshTestEnvironment;

#[tokio::test]
async fn test_password_auth_success() {
    skip_if_no_docker!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let client = env.client(HostKeyPolicy::AcceptNew);

    let session = client
        .connect(&env.server.host, &env.password_config())
        .await
        .expect("Password authentication should succeed");

    assert!(session.is_connected());
    session.disconnect().await.expect("disconnect");
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_wrong_password_fails() {
    skip_if_no_docker!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let client = env.client(HostKeyPolicy::AcceptNew);

    let mut config = env.password_config();
    config.password = Some(SecretString::from("wrong-password".to_string()));

    let err = client
        .connect(&env.server.host, &config)
        .await
        .expect_err("Wrong password must be rejected");
    assert!(matches!(err, SshError::AuthenticationFailed(_)), "got {:?}", err);
    assert!(err.is_connection_error());
}

#[tokio::test]
async fn test_public_key_auth_success() {
    skip_if_no_docker!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    if !env.server.private_key_path.exists() {
        eprintln!("Skipping test: test keys not generated");
        return;
    }
    let client = env.client(HostKeyPolicy::AcceptNew);

    let session = client
        .connect(&env.server.host, &env.key_config())
        .await
        .expect("Key authentication should succeed");
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_encrypted_key_with_passphrase() {
    skip_if_no_docker!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    if !env.server.encrypted_key_path.exists() {
        eprintln!("Skipping test: encrypted test key not generated");
        return;
    }
    let client = env.client(HostKeyPolicy::AcceptNew);

    let config = ConnectionConfig {
        port: Some(env.server.port),
        use_agent: Some(false),
        passphrase: Some(SecretString::from(env.server.key_passphrase.clone())),
        ..ConnectionConfig::with_private_key(&env.server.username, &env.server.encrypted_key_path)
    };

    let session = client
        .connect(&env.server.host, &config)
        .await
        .expect("Encrypted key with passphrase should authenticate");
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_execute_captures_output_and_exit_code() {
    skip_if_no_docker!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let client = env.client(HostKeyPolicy::AcceptNew);
    let session = client
        .connect(&env.server.host, &env.password_config())
        .await
        .expect("connect");

    let result = session
        .execute_command("echo out; echo err >&2; exit 3")
        .await
        .expect("command should be dispatched");

    assert_eq!(result.stdout.trim(), "out");
    assert_eq!(result.stderr.trim(), "err");
    assert_eq!(result.exit_code, 3);
    assert!(!result.success());
}

#[tokio::test]
async fn test_execute_after_disconnect_is_channel_error() {
    skip_if_no_docker!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let client = env.client(HostKeyPolicy::AcceptNew);
    let session = client
        .connect(&env.server.host, &env.password_config())
        .await
        .expect("connect");

    session.disconnect().await.expect("disconnect");
    session.disconnect().await.expect("second disconnect is a no-op");

    let err = session
        .execute_command("true")
        .await
        .expect_err("closed session cannot run commands");
    assert!(err.is_execution_error());
}

#[tokio::test]
async fn test_host_key_learned_then_trusted() {
    skip_if_no_docker!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    assert!(!env.known_hosts_path.exists());

    let client = env.client(HostKeyPolicy::AcceptNew);
    client
        .connect(&env.server.host, &env.password_config())
        .await
        .expect("first connection learns the key");
    let content = std::fs::read_to_string(&env.known_hosts_path).expect("known_hosts written");
    assert!(content.contains(&format!("[{}]:{}", env.server.host, env.server.port)));

    // Once learned, strict checking accepts the host
    let strict = env.client(HostKeyPolicy::Strict);
    strict
        .connect(&env.server.host, &env.password_config())
        .await
        .expect("known host passes strict checking");
}

#[tokio::test]
async fn test_strict_policy_rejects_unknown_host() {
    skip_if_no_docker!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let client = env.client(HostKeyPolicy::Strict);

    let err = client
        .connect(&env.server.host, &env.password_config())
        .await
        .expect_err("unknown host must be rejected");
    assert!(matches!(err, SshError::HostKeyVerification(_)), "got {:?}", err);
    assert!(!env.known_hosts_path.exists());
}

#[tokio::test]
async fn test_connection_refused() {
    let client = hostlink::ssh::SshClient::default();
    let config = ConnectionConfig {
        port: Some(1),
        ..ConnectionConfig::with_password("nobody", "nothing")
    };

    let err = client
        .connect("127.0.0.1", &config)
        .await
        .expect_err("nothing listens on port 1");
    assert!(err.is_connection_error());
}
