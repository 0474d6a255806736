// スマートメータ接続情報
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::error::{Error, Result};
use crate::skstack::authn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// スマートメータ接続情報
///
/// 時間の設定値は秒、0 は無効
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionSettings {
    pub route_b_id: Option<String>,
    pub route_b_password: Option<String>,
    pub power_interval_sec: u32,
    pub energy_interval_sec: u32,
    pub rejoin_miss_count: u8,
    pub rejoin_timeout_sec: u32,
    pub rescan_timeout_sec: u32,
    pub restart_timeout_sec: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            route_b_id: None,
            route_b_password: None,
            power_interval_sec: 30,
            energy_interval_sec: 60,
            rejoin_miss_count: 0,
            rejoin_timeout_sec: 0,
            rescan_timeout_sec: 0,
            restart_timeout_sec: 0,
        }
    }
}

impl ConnectionSettings {
    /// TOMLファイルから読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        Self::from_str(&s)
    }

    /// ルートB認証情報
    pub fn credentials(&self) -> Result<authn::Credentials> {
        let (Some(id), Some(password)) = (&self.route_b_id, &self.route_b_password) else {
            return Err(Error::CredentialsNotSet);
        };
        Ok(authn::Credentials {
            id: authn::Id::from_str(id).map_err(Error::InvalidId)?,
            password: authn::Password::from_str(password).map_err(Error::InvalidPassword)?,
        })
    }
}

impl FromStr for ConnectionSettings {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

#[test]
fn test1() {
    let settings = ConnectionSettings::from_str(
        r#"
route_b_id = "0123456789ABCDEF0123456789ABCDEF"
route_b_password = "PASSWORD1234"
power_interval_sec = 10
rejoin_miss_count = 3
restart_timeout_sec = 600
"#,
    )
    .unwrap();
    assert_eq!(settings.power_interval_sec, 10);
    assert_eq!(settings.energy_interval_sec, 60);
    assert_eq!(settings.rejoin_miss_count, 3);
    assert_eq!(settings.rejoin_timeout_sec, 0);
    assert_eq!(settings.restart_timeout_sec, 600);
    let credentials = settings.credentials().unwrap();
    assert_eq!(credentials.id.to_string(), "0123456789ABCDEF0123456789ABCDEF");
    assert_eq!(credentials.password.to_string(), "PASSWORD1234");
}

#[test]
fn test2() {
    let settings = ConnectionSettings::default();
    assert!(matches!(settings.credentials(), Err(Error::CredentialsNotSet)));

    let settings = ConnectionSettings {
        route_b_id: Some("0123".into()),
        route_b_password: Some("PASSWORD1234".into()),
        ..Default::default()
    };
    assert!(matches!(settings.credentials(), Err(Error::InvalidId(_))));

    let settings = ConnectionSettings {
        route_b_id: Some("0123456789ABCDEF0123456789ABCDEF".into()),
        route_b_password: Some("PASS".into()),
        ..Default::default()
    };
    assert!(matches!(settings.credentials(), Err(Error::InvalidPassword(_))));

    assert!(matches!(
        ConnectionSettings::from_str("power_interval_sec = \"x\""),
        Err(Error::Config(_))
    ));
}
