// service/src/services/signature.rs

//! HMAC-SHA256 check of gateway payment callbacks.
//!
//! The gateway signs `"{order_id}|{payment_id}"` with the merchant key secret
//! and sends the digest as lowercase hex. This is the only thing standing
//! between a client claiming "payment succeeded" and an enrollment, so every
//! malformed input is a plain `false`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const DIGEST_HEX_LEN: usize = 64;

#[derive(Clone)]
pub struct SignatureVerifier {
  secret: String,
}

impl std::fmt::Debug for SignatureVerifier {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SignatureVerifier").field("secret", &"[REDACTED]").finish()
  }
}

impl SignatureVerifier {
  pub fn new(secret: impl Into<String>) -> Self {
    Self { secret: secret.into() }
  }

  fn mac_for(&self, order_id: &str, payment_id: &str) -> Option<HmacSha256> {
    if self.secret.is_empty() {
      return None;
    }
    let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).ok()?;
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    Some(mac)
  }

  /// Reference signature for `(order_id, payment_id)`, lowercase hex.
  /// Empty when the secret is missing.
  pub fn sign(&self, order_id: &str, payment_id: &str) -> String {
    self
      .mac_for(order_id, payment_id)
      .map(|mac| hex::encode(mac.finalize().into_bytes()))
      .unwrap_or_default()
  }

  pub fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
    if order_id.is_empty() || payment_id.is_empty() || signature.len() != DIGEST_HEX_LEN {
      return false;
    }
    // hex::decode accepts uppercase; the wire format does not.
    if !signature.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
      return false;
    }
    let Ok(provided) = hex::decode(signature) else {
      return false;
    };
    match self.mac_for(order_id, payment_id) {
      Some(mac) => mac.verify_slice(&provided).is_ok(),
      None => {
        tracing::error!("Signature secret is not configured; rejecting callback.");
        false
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SECRET: &str = "rzp_test_secret_value";

  #[test]
  fn matches_independently_computed_digest() {
    let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(b"order_9A33XWu170gUtm|pay_29QQoUBi66xm2f");
    let expected = hex::encode(mac.finalize().into_bytes());

    let verifier = SignatureVerifier::new(SECRET);
    assert_eq!(verifier.sign("order_9A33XWu170gUtm", "pay_29QQoUBi66xm2f"), expected);
    assert!(verifier.verify("order_9A33XWu170gUtm", "pay_29QQoUBi66xm2f", &expected));
  }

  #[test]
  fn every_single_character_mutation_is_rejected() {
    let verifier = SignatureVerifier::new(SECRET);
    let valid = verifier.sign("order_A", "pay_B");
    let alphabet: Vec<char> = "0123456789abcdefABCDEFxz".chars().collect();

    for (idx, original) in valid.char_indices() {
      for replacement in alphabet.iter().copied().filter(|c| *c != original) {
        let mut mutated: Vec<char> = valid.chars().collect();
        mutated[idx] = replacement;
        let mutated: String = mutated.into_iter().collect();
        assert!(
          !verifier.verify("order_A", "pay_B", &mutated),
          "mutation at {} to '{}' accepted",
          idx,
          replacement
        );
      }
    }
  }

  #[test]
  fn wrong_secret_or_swapped_ids_fail() {
    let signature = SignatureVerifier::new("other-secret").sign("order_A", "pay_B");
    let verifier = SignatureVerifier::new(SECRET);
    assert!(!verifier.verify("order_A", "pay_B", &signature));

    let own = verifier.sign("order_A", "pay_B");
    assert!(!verifier.verify("pay_B", "order_A", &own));
  }

  #[test]
  fn missing_inputs_or_secret_are_failures_not_errors() {
    let verifier = SignatureVerifier::new(SECRET);
    let valid = verifier.sign("order_A", "pay_B");
    assert!(!verifier.verify("", "pay_B", &valid));
    assert!(!verifier.verify("order_A", "", &valid));
    assert!(!verifier.verify("order_A", "pay_B", ""));
    assert!(!verifier.verify("order_A", "pay_B", &valid[..63]));

    let unconfigured = SignatureVerifier::new("");
    assert_eq!(unconfigured.sign("order_A", "pay_B"), "");
    assert!(!unconfigured.verify("order_A", "pay_B", &valid));
  }

  #[test]
  fn separator_is_part_of_the_signed_message() {
    let verifier = SignatureVerifier::new(SECRET);
    // "ab|c" and "a|bc" must not collide.
    assert_ne!(verifier.sign("ab", "c"), verifier.sign("a", "bc"));
  }
}
