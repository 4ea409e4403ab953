use crate::error::FieldError;

pub fn username(value: &str) -> Result<(), FieldError> {
    let len = value.chars().count();
    if !(3..=32).contains(&len) {
        return Err(FieldError::new("username", "must be 3 to 32 characters"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(FieldError::new(
            "username",
            "may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(())
}

pub fn email(value: &str) -> Result<(), FieldError> {
    let invalid = || FieldError::new("email", "must be a valid email address");
    if value.len() > 254 || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid());
    }
    let (local, domain) = value.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels_ok = domain.contains('.')
        && domain
            .split('.')
            .all(|label| !label.is_empty() && !label.starts_with('-') && !label.ends_with('-'));
    if !labels_ok {
        return Err(invalid());
    }
    Ok(())
}

pub fn password(value: &str, min_len: usize) -> Result<(), FieldError> {
    if value.chars().count() < min_len {
        return Err(FieldError::new(
            "password",
            format!("must be at least {min_len} characters"),
        ));
    }
    // argon2 accepts longer input, but unbounded input is a cheap DoS
    if value.len() > 1024 {
        return Err(FieldError::new("password", "is too long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        assert!(username("alice_01").is_ok());
        assert!(username("al").is_err());
        assert!(username("bad name").is_err());
        assert!(username(&"x".repeat(33)).is_err());
    }

    #[test]
    fn emails() {
        assert!(email("a@example.com").is_ok());
        assert!(email("a.b+c@mail.example.org").is_ok());
        assert!(email("no-at-sign").is_err());
        assert!(email("@example.com").is_err());
        assert!(email("a@localhost").is_err());
        assert!(email("a@b@c.com").is_err());
        assert!(email("a@example..com").is_err());
        assert!(email("a b@example.com").is_err());
    }

    #[test]
    fn passwords() {
        assert!(password("12345678", 8).is_ok());
        assert!(password("1234567", 8).is_err());
        assert!(password(&"p".repeat(2000), 8).is_err());
    }
}
