//! Auto-generated display names for projects and topics: 10-character
//! alphanumeric strings, matching the original signup/project-create flow.

use rand::distributions::Alphanumeric;
use rand::Rng;

const NAME_LEN: usize = 10;

pub fn random_display_name() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NAME_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_the_expected_length() {
        let name = random_display_name();
        assert_eq!(name.len(), NAME_LEN);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
