//! The `$ANSIBLE_VAULT` text envelope.
//!
//! Encrypted payloads travel as ASCII text: a signature line naming the
//! format version and cipher, then the hex-encoded payload body wrapped
//! at 80 columns. The body decodes to `hex(salt) || "\n" || mac_hexdigest
//! || "\n" || hex(ciphertext)`, so the binary fields are hex-encoded
//! twice end to end.

use super::CipherError;

/// Signature line of the only envelope version this crate speaks.
pub const HEADER: &str = "$ANSIBLE_VAULT;1.1;AES256";

/// Shared prefix of every vault envelope version.
const HEADER_PREFIX: &[u8] = b"$ANSIBLE_VAULT";

/// Column width the payload body is wrapped at.
const WRAP_WIDTH: usize = 80;

/// Returns true when `data` begins with the 1.1 signature line.
///
/// This is the cheap classification sniff used on file contents; it does
/// not validate the payload body.
pub fn is_vault_data(data: &[u8]) -> bool {
    data.starts_with(HEADER.as_bytes())
}

/// A parsed envelope: the three binary fields of the payload body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Key derivation salt, 32 random bytes in practice.
    pub salt: Vec<u8>,
    /// HMAC-SHA256 digest over the raw ciphertext.
    pub mac: [u8; 32],
    /// AES-256-CTR ciphertext, a whole number of 16-byte blocks.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Parse envelope text into its binary fields.
    ///
    /// Accepts arbitrary line wrapping and CRLF line endings in the body.
    /// The MAC is not verified here; that happens during decryption once
    /// the HMAC key has been derived.
    pub fn parse(data: &[u8]) -> Result<Self, CipherError> {
        let newline = data
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(CipherError::Malformed {
                reason: "missing payload body after the signature line",
            })?;
        let header = data[..newline].trim_ascii();
        if header != HEADER.as_bytes() {
            if header.starts_with(HEADER_PREFIX) {
                return Err(CipherError::UnsupportedEnvelope {
                    header: String::from_utf8_lossy(header).into_owned(),
                });
            }
            return Err(CipherError::Malformed {
                reason: "first line is not a vault signature",
            });
        }

        let body: Vec<u8> = data[newline + 1..]
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let inner = hex::decode(&body).map_err(|_| CipherError::Malformed {
            reason: "payload body is not valid hex",
        })?;

        let mut fields = inner.splitn(3, |&b| b == b'\n');
        let salt_hex = fields.next().unwrap_or_default();
        let mac_hex = fields.next().ok_or(CipherError::Malformed {
            reason: "payload is missing the MAC field",
        })?;
        let ciphertext_hex = fields.next().ok_or(CipherError::Malformed {
            reason: "payload is missing the ciphertext field",
        })?;

        let salt = hex::decode(salt_hex).map_err(|_| CipherError::Malformed {
            reason: "salt field is not valid hex",
        })?;
        if salt.is_empty() {
            return Err(CipherError::Malformed {
                reason: "salt field is empty",
            });
        }
        let mac_bytes = hex::decode(mac_hex).map_err(|_| CipherError::Malformed {
            reason: "MAC field is not valid hex",
        })?;
        let mac: [u8; 32] = mac_bytes
            .as_slice()
            .try_into()
            .map_err(|_| CipherError::Malformed {
                reason: "MAC digest has the wrong length",
            })?;
        let ciphertext = hex::decode(ciphertext_hex).map_err(|_| CipherError::Malformed {
            reason: "ciphertext field is not valid hex",
        })?;

        Ok(Envelope {
            salt,
            mac,
            ciphertext,
        })
    }

    /// Render the envelope back into its text form.
    ///
    /// Output always ends with a newline and uses lowercase hex, matching
    /// what other vault tooling emits byte for byte aside from the random
    /// salt.
    pub fn format(&self) -> String {
        let inner = format!(
            "{}\n{}\n{}",
            hex::encode(&self.salt),
            hex::encode(self.mac),
            hex::encode(&self.ciphertext)
        );
        let body = hex::encode(inner.as_bytes());

        let mut text = String::with_capacity(HEADER.len() + body.len() + body.len() / WRAP_WIDTH + 2);
        text.push_str(HEADER);
        text.push('\n');
        let mut rest = body.as_str();
        while !rest.is_empty() {
            let (line, tail) = rest.split_at(rest.len().min(WRAP_WIDTH));
            text.push_str(line);
            text.push('\n');
            rest = tail;
        }
        text
    }
}
