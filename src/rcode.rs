// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Response-code reason and message mapping for the `Degraded` condition.
//!
//! Every rcode assigned by IANA for the RFC 1035, 2845, 6891 and 7873
//! unions maps to a `(reason, message)` pair. The reason is the rcode
//! mnemonic and lands in the condition's `reason` field; the message is the
//! IANA description and lands in `message`. Codes outside the table fall
//! through to a generic unknown-rcode message.

use hickory_client::op::ResponseCode;

/// The mnemonic of an rcode, used as the condition reason.
#[must_use]
pub fn rcode_reason(rcode: ResponseCode) -> String {
    match rcode {
        ResponseCode::NoError => "NOERROR".to_string(),
        ResponseCode::FormErr => "FORMERR".to_string(),
        ResponseCode::ServFail => "SERVFAIL".to_string(),
        ResponseCode::NXDomain => "NXDOMAIN".to_string(),
        ResponseCode::NotImp => "NOTIMP".to_string(),
        ResponseCode::Refused => "REFUSED".to_string(),
        ResponseCode::YXDomain => "YXDOMAIN".to_string(),
        ResponseCode::YXRRSet => "YXRRSET".to_string(),
        ResponseCode::NXRRSet => "NXRRSET".to_string(),
        ResponseCode::NotAuth => "NOTAUTH".to_string(),
        ResponseCode::NotZone => "NOTZONE".to_string(),
        ResponseCode::BADVERS => "BADVERS".to_string(),
        ResponseCode::BADSIG => "BADSIG".to_string(),
        ResponseCode::BADKEY => "BADKEY".to_string(),
        ResponseCode::BADTIME => "BADTIME".to_string(),
        ResponseCode::BADMODE => "BADMODE".to_string(),
        ResponseCode::BADNAME => "BADNAME".to_string(),
        ResponseCode::BADALG => "BADALG".to_string(),
        ResponseCode::BADTRUNC => "BADTRUNC".to_string(),
        ResponseCode::BADCOOKIE => "BADCOOKIE".to_string(),
        ResponseCode::Unknown(code) => format!("RCODE{code}"),
    }
}

/// The human-readable description of an rcode, used as the condition message.
#[must_use]
pub fn rcode_message(rcode: ResponseCode) -> String {
    let message = match rcode {
        ResponseCode::NoError => "No Error",
        ResponseCode::FormErr => "Format Error",
        ResponseCode::ServFail => "Server Failure",
        ResponseCode::NXDomain => "Non-Existent Domain",
        ResponseCode::NotImp => "Not Implemented",
        ResponseCode::Refused => "Query Refused",
        ResponseCode::YXDomain => "Name Exists when it should not",
        ResponseCode::YXRRSet => "RR Set Exists when it should not",
        ResponseCode::NXRRSet => "RR Set that should exist does not",
        ResponseCode::NotAuth => "Server Not Authoritative for zone",
        ResponseCode::NotZone => "Name not contained in zone",
        ResponseCode::BADVERS => "Bad OPT Version",
        ResponseCode::BADSIG => "TSIG Signature Failure",
        ResponseCode::BADKEY => "Key not recognized",
        ResponseCode::BADTIME => "Signature out of time window",
        ResponseCode::BADMODE => "Bad TKEY Mode",
        ResponseCode::BADNAME => "Duplicate key name",
        ResponseCode::BADALG => "Algorithm not supported",
        ResponseCode::BADTRUNC => "Bad Truncation",
        ResponseCode::BADCOOKIE => "Bad/missing Server Cookie",
        ResponseCode::Unknown(_) => "Unknown rcode",
    };
    message.to_string()
}

#[cfg(test)]
#[path = "rcode_tests.rs"]
mod rcode_tests;
