// ルートB認証情報
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//

#[derive(Debug, Clone, PartialEq, Eq)]
/// 認証情報
pub struct Credentials {
    pub id: Id,
    pub password: Password,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// ID
pub struct Id([char; 32]);
impl std::str::FromStr for Id {
    type Err = String;
    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .collect::<Vec<char>>()
            .try_into()
            .map(Self)
            .map_err(|_| "IDは32文字固定長です".to_string())
    }
}
impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().collect::<String>())
    }
}

#[derive(Clone, PartialEq, Eq)]
/// パスワード
pub struct Password([char; 12]);
impl Password {
    /// 文字数
    pub fn len(&self) -> usize {
        self.0.len()
    }
}
impl std::str::FromStr for Password {
    type Err = String;
    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .collect::<Vec<char>>()
            .try_into()
            .map(Self)
            .map_err(|_| "PASSWORDは12文字固定長です".to_string())
    }
}
impl std::fmt::Display for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().collect::<String>())
    }
}
impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Password(############)")
    }
}

#[test]
fn test1() {
    use std::str::FromStr;
    let id = Id::from_str("0123456789ABCDEF0123456789ABCDEF").unwrap();
    assert_eq!(id.to_string(), "0123456789ABCDEF0123456789ABCDEF");
    assert!(Id::from_str("0123").is_err());

    let password = Password::from_str("PASSWORD1234").unwrap();
    assert_eq!(password.len(), 12);
    assert_eq!(password.to_string(), "PASSWORD1234");
    assert_eq!(format!("{:?}", password), "Password(############)");
    assert!(Password::from_str("PASSWORD12345").is_err());
}
