//! Invoice number prefixes and invoice number formatting.

use rand::Rng;

/// Letters used to fill prefix slots a client name cannot supply.
pub const PREFIX_FILL_ALPHABET: &[u8; 23] = b"ABCDHIJKLMNOPQRSTUVWXYZ";

/// Number of characters in an invoice prefix.
pub const PREFIX_LEN: usize = 3;

/// Derive a 3-letter invoice prefix from a client's display name.
///
/// The name is uppercased and split on every run of characters outside
/// `A`-`Z` (digits and punctuation are separators). Each of the first three
/// tokens contributes its first letter; missing slots are filled at random
/// from [`PREFIX_FILL_ALPHABET`].
///
/// ```
/// use invoys_service::utils::generate_prefix;
///
/// assert_eq!(generate_prefix(Some("Arctic Wolf Networks, Inc ")), "AWN");
/// assert_eq!(generate_prefix(None).len(), 3);
/// ```
pub fn generate_prefix(name: Option<&str>) -> String {
    generate_prefix_with(name, &mut rand::thread_rng())
}

/// [`generate_prefix`] with an explicit random source.
pub fn generate_prefix_with<R: Rng + ?Sized>(name: Option<&str>, rng: &mut R) -> String {
    let upper = name.unwrap_or_default().to_uppercase();
    let mut initials = upper
        .split(|c: char| !c.is_ascii_uppercase())
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.chars().next());

    (0..PREFIX_LEN)
        .map(|_| {
            initials.next().unwrap_or_else(|| {
                PREFIX_FILL_ALPHABET[rng.gen_range(0..PREFIX_FILL_ALPHABET.len())] as char
            })
        })
        .collect()
}

/// Format an invoice number as `<prefix>-<sequence>`, the sequence
/// zero-padded to at least four digits.
pub fn format_invoice_number(prefix: &str, sequence: i32) -> String {
    format!("{}-{:04}", prefix, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn is_prefix(s: &str) -> bool {
        s.len() == PREFIX_LEN && s.chars().all(|c| c.is_ascii_uppercase())
    }

    #[test]
    fn takes_initials_of_first_three_words() {
        assert_eq!(generate_prefix(Some("Arctic Wolf Networks, Inc ")), "AWN");
    }

    #[test]
    fn digits_are_separators() {
        assert_eq!(generate_prefix(Some("Arctic 1Wolf Neworks, Inc ")), "AWN");
        assert_eq!(generate_prefix(Some("acme9widgets7norge")), "AWN");
    }

    #[test]
    fn lowercase_single_word_keeps_its_initial() {
        let prefix = generate_prefix(Some("arctic"));
        assert!(is_prefix(&prefix));
        assert!(prefix.starts_with('A'));
    }

    #[test]
    fn absent_or_empty_name_is_fully_random() {
        assert!(is_prefix(&generate_prefix(None)));
        assert!(is_prefix(&generate_prefix(Some(""))));
        assert!(is_prefix(&generate_prefix(Some("  123 --- 456 "))));
    }

    #[test]
    fn random_fill_uses_only_the_fill_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let prefix = generate_prefix_with(None, &mut rng);
            assert!(prefix.bytes().all(|b| PREFIX_FILL_ALPHABET.contains(&b)));
            assert!(!prefix.contains(['E', 'F', 'G']));
        }
    }

    #[test]
    fn seeded_fill_is_deterministic() {
        let a = generate_prefix_with(Some("solo"), &mut StdRng::seed_from_u64(42));
        let b = generate_prefix_with(Some("solo"), &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
        assert!(a.starts_with('S'));
    }

    #[test]
    fn invoice_number_is_zero_padded() {
        assert_eq!(format_invoice_number("AWN", 1), "AWN-0001");
        assert_eq!(format_invoice_number("AWN", 42), "AWN-0042");
        assert_eq!(format_invoice_number("AWN", 12345), "AWN-12345");
    }
}
