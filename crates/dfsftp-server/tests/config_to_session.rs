//! Config file + user file + shell, wired the way the binary does it.

use std::fs;

use dfsftp_kernel::ViewFactory;
use dfsftp_server::{Overrides, ServerConfig, Shell, StoreKind, UserFile};
use tempfile::TempDir;

const USERS: &str = "\
ftpserver.user.alice.homedirectory=/user/alice
ftpserver.user.alice.groups=staff
ftpserver.user.mallory.homedirectory=/user/mallory
ftpserver.user.mallory.enableflag=false
";

fn write_fixture(dir: &TempDir, store_kind: &str) -> std::path::PathBuf {
    let users = dir.path().join("users.properties");
    fs::write(&users, USERS).unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();

    let config = dir.path().join("dfsftp.toml");
    fs::write(
        &config,
        format!(
            "user_conf = {users:?}\n\n[store]\nkind = \"{store_kind}\"\nroot = {data:?}\n\n[view]\nuse_store_principal = true\n",
            users = users.display().to_string(),
            data = data.display().to_string(),
        ),
    )
    .unwrap();
    config
}

#[tokio::test]
async fn memory_store_shell_session() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "memory");

    let mut config = ServerConfig::load(Some(&path)).unwrap();
    config
        .apply(Overrides {
            port: Some(2121),
            ..Overrides::default()
        })
        .unwrap();
    config.validate().unwrap();
    assert_eq!(config.store.kind, StoreKind::Memory);

    let users = UserFile::load(config.user_conf().unwrap()).unwrap();
    assert_eq!(users.enabled().count(), 1);
    assert!(users.identity("mallory").is_err());

    // the memory store's principal is the login name
    let factory = ViewFactory::with_config(config.connector().unwrap(), config.view.clone());
    let view = factory.create(users.identity("alice").unwrap()).await.unwrap();
    assert_eq!(view.identity().name(), "alice");

    let script = "mkdir reports\ncd reports\nput q1.txt numbers\ncat q1.txt\npwd\ncd /\npwd\n";
    let mut output = Vec::new();
    Shell::new(view).run(script.as_bytes(), &mut output).await.unwrap();

    let output = String::from_utf8(output).unwrap();
    let lines: Vec<_> = output.lines().collect();
    assert_eq!(
        lines,
        vec![
            "ok",
            "/user/alice/reports",
            "wrote 7 bytes",
            "numbers",
            "/user/alice/reports",
            "/user/alice",
        ]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn local_store_provisions_homes_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "local");

    let config = ServerConfig::load(Some(&path)).unwrap();
    config.validate().unwrap();

    let users = UserFile::load(config.user_conf().unwrap()).unwrap();
    let factory = ViewFactory::with_config(config.connector().unwrap(), config.view.clone());
    for record in users.enabled() {
        factory.create(record.identity().unwrap()).await.unwrap().dispose();
    }

    assert!(dir.path().join("data/user/alice").is_dir());
    assert!(!dir.path().join("data/user/mallory").exists());
}

#[test]
fn missing_user_file_fails_validation() {
    let dir = TempDir::new().unwrap();
    let mut config = ServerConfig::default();
    config
        .apply(Overrides {
            user_conf: Some(dir.path().join("absent.properties")),
            ..Overrides::default()
        })
        .unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}
