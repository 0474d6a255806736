// エラー
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(r#"i/o "{0}""#)]
    Io(#[from] io::Error),

    #[error(r#"config "{0}""#)]
    Config(#[from] toml::de::Error),

    #[error("Route B ID/Password not set")]
    CredentialsNotSet,

    #[error(r#"invalid id "{0}""#)]
    InvalidId(String),

    #[error(r#"invalid password "{0}""#)]
    InvalidPassword(String),
}

pub type Result<T> = std::result::Result<T, Error>;
