// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use ethers::types::Address;
use ethers::utils::to_checksum;

/// Errors while parsing a scanner address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    /// Missing the `0x` prefix.
    #[error("address must start with 0x")]
    MissingPrefix,
    /// Not 40 hex characters after the prefix.
    #[error("address must have 40 hex characters")]
    InvalidLength,
    /// A character outside `[0-9a-fA-F]`.
    #[error("address contains non hex characters")]
    InvalidHex,
    /// Mixed case that is not the EIP-55 checksum of the address.
    #[error("address checksum mismatch")]
    InvalidChecksum,
}

/// Parses a scanner address the way wallets and web3 clients validate them.
///
/// All lower or all upper case hex is accepted as is. Mixed case has to be a
/// valid EIP-55 checksum.
pub fn parse_scanner_address(s: &str) -> Result<Address, AddressParseError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or(AddressParseError::MissingPrefix)?;
    if digits.len() != 40 {
        return Err(AddressParseError::InvalidLength);
    }
    let mut bytes = [0u8; 20];
    hex::decode_to_slice(digits, &mut bytes)
        .map_err(|_| AddressParseError::InvalidHex)?;
    let address = Address::from(bytes);

    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        let checksummed = to_checksum(&address, None);
        if checksummed[2..] != *digits {
            return Err(AddressParseError::InvalidChecksum);
        }
    }
    Ok(address)
}

/// Formats an address in its EIP-55 checksummed form.
pub fn checksummed(address: &Address) -> String {
    to_checksum(address, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Taken from the EIP-55 test vectors.
    const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    #[test]
    fn accepts_single_case_and_valid_checksum() {
        let expected = parse_scanner_address(CHECKSUMMED).unwrap();
        let lower = CHECKSUMMED.to_lowercase();
        let upper = format!("0x{}", CHECKSUMMED[2..].to_uppercase());
        assert_eq!(parse_scanner_address(&lower).unwrap(), expected);
        assert_eq!(parse_scanner_address(&upper).unwrap(), expected);
        assert_eq!(checksummed(&expected), CHECKSUMMED);
    }

    #[test]
    fn rejects_broken_checksum() {
        // flip the case of a single letter.
        let broken = CHECKSUMMED.replacen("aA", "aa", 1);
        assert_eq!(
            parse_scanner_address(&broken),
            Err(AddressParseError::InvalidChecksum)
        );
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert_eq!(
            parse_scanner_address(&CHECKSUMMED[2..]),
            Err(AddressParseError::MissingPrefix)
        );
        assert_eq!(
            parse_scanner_address("0x1234"),
            Err(AddressParseError::InvalidLength)
        );
        let not_hex = format!("0x{}", "g".repeat(40));
        assert_eq!(
            parse_scanner_address(&not_hex),
            Err(AddressParseError::InvalidHex)
        );
    }
}
