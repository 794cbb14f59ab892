//! Argument parser for fork requests.
//!
//! Parses argument strings in the format:
//! ip:port[,channel_id][,exten][,caller_id][,called_id]
//!
//! Empty tokens are skipped, so "10.0.0.1:9000,,1000" sets channel_id to
//! "1000". Anything after the fifth argument is ignored.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use log::warn;

use crate::error::{ForkError, ForkResult};
use crate::tlv::StreamMetadata;

/// Placeholder channel id replaced by the host's channel name.
pub const UNKNOWN_CHANNEL: &str = "unknown";

/// Parsed fork request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkArgs {
    /// Where packets are sent
    pub destination: SocketAddrV4,
    /// Metadata announced in signaling packets
    pub metadata: StreamMetadata,
}

impl ForkArgs {
    /// True when no usable channel id was supplied.
    pub fn needs_channel_name(&self) -> bool {
        self.metadata.channel_id.is_empty() || self.metadata.channel_id == UNKNOWN_CHANNEL
    }
}

/// Parse and validate an `ip:port` destination.
///
/// The IP must be a dotted-quad IPv4 address and the port a decimal number
/// in 1..=65535.
pub fn parse_destination(input: &str) -> ForkResult<SocketAddrV4> {
    let invalid = || ForkError::InvalidDestination(input.to_string());

    let (ip_str, port_str) = input.split_once(':').ok_or_else(invalid)?;
    if ip_str.is_empty() || port_str.is_empty() {
        return Err(invalid());
    }

    let ip = Ipv4Addr::from_str(ip_str).map_err(|_| invalid())?;

    if !port_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let port: u16 = port_str.parse().map_err(|_| invalid())?;
    if port == 0 {
        return Err(invalid());
    }

    Ok(SocketAddrV4::new(ip, port))
}

/// Parse a full argument string.
pub fn parse_arguments(input: &str) -> ForkResult<ForkArgs> {
    if input.trim().is_empty() {
        return Err(ForkError::InvalidArguments("no arguments specified".to_string()));
    }

    let mut destination = None;
    let mut fields: [&str; 4] = [""; 4];
    let mut count = 0;

    for token in input.split(',').filter(|t| !t.is_empty()) {
        match count {
            0 => destination = Some(parse_destination(token)?),
            1..=4 => fields[count - 1] = token,
            _ => warn!("ForkStream: Ignoring extra argument: '{}'", token),
        }
        count += 1;
    }

    let destination = destination
        .ok_or_else(|| ForkError::InvalidArguments("missing destination".to_string()))?;

    let channel_id = if fields[0].is_empty() {
        UNKNOWN_CHANNEL
    } else {
        fields[0]
    };

    Ok(ForkArgs {
        destination,
        metadata: StreamMetadata::new(channel_id, fields[1], fields[2], fields[3]),
    })
}

impl FromStr for ForkArgs {
    type Err = ForkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_arguments(s)
    }
}

impl fmt::Display for ForkArgs {
    /// Format back into an argument string; trailing empty fields are omitted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.destination)?;

        let m = &self.metadata;
        let fields = [&m.channel_id, &m.exten, &m.caller_id, &m.called_id];
        let used = fields.iter().rposition(|v| !v.is_empty()).map_or(0, |i| i + 1);
        for value in &fields[..used] {
            write!(f, ",{}", value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_destinations() {
        for (input, ip, port) in [
            ("192.168.1.100:8080", Ipv4Addr::new(192, 168, 1, 100), 8080),
            ("127.0.0.1:1234", Ipv4Addr::new(127, 0, 0, 1), 1234),
            ("10.0.0.1:65535", Ipv4Addr::new(10, 0, 0, 1), 65535),
            ("172.16.0.1:1", Ipv4Addr::new(172, 16, 0, 1), 1),
        ] {
            let dest = parse_destination(input).unwrap();
            assert_eq!(dest, SocketAddrV4::new(ip, port));
            assert_eq!(dest.to_string(), input);
        }
    }

    #[test]
    fn test_parse_invalid_destinations() {
        for input in [
            "",
            "192.168.1.100",
            ":8080",
            "192.168.1.100:",
            "invalid.ip:8080",
            "192.168.1.100:abc",
            "192.168.1.100:0",
            "192.168.1.100:65536",
            "192.168.1.100:-1",
            "192.168.1.100:+80",
            "256.1.1.1:8080",
            "1.2.3:8080",
            "10.0.0.1:80:90",
        ] {
            match parse_destination(input) {
                Err(ForkError::InvalidDestination(s)) => assert_eq!(s, input),
                other => panic!("{:?} should be rejected, got {:?}", input, other),
            }
        }
    }

    #[test]
    fn test_parse_destination_only() {
        let args = parse_arguments("192.168.1.100:8080").unwrap();
        assert_eq!(args.destination, SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 100), 8080));
        assert_eq!(args.metadata.channel_id, UNKNOWN_CHANNEL);
        assert!(args.metadata.exten.is_empty());
        assert!(args.needs_channel_name());
    }

    #[test]
    fn test_parse_full_arguments() {
        let args =
            parse_arguments("192.168.1.100:8080,SIP/alice-1,1000,+15550001111,+15550002222")
                .unwrap();
        assert_eq!(
            args.metadata,
            StreamMetadata::new("SIP/alice-1", "1000", "+15550001111", "+15550002222")
        );
        assert!(!args.needs_channel_name());
    }

    #[test]
    fn test_empty_tokens_skipped_and_extras_ignored() {
        let args = parse_arguments("10.0.0.1:9000,,chan,,100,200,300,400").unwrap();
        assert_eq!(args.metadata.channel_id, "chan");
        assert_eq!(args.metadata.exten, "100");
        assert_eq!(args.metadata.caller_id, "200");
        assert_eq!(args.metadata.called_id, "300");
    }

    #[test]
    fn test_bad_destination_fails_whole_parse() {
        assert!(matches!(
            parse_arguments("10.0.0.1:0,chan"),
            Err(ForkError::InvalidDestination(_))
        ));
        assert!(matches!(parse_arguments("   "), Err(ForkError::InvalidArguments(_))));
        assert!(matches!(parse_arguments(",,,"), Err(ForkError::InvalidArguments(_))));
    }

    #[test]
    fn test_metadata_bounded_on_parse() {
        let long_exten = "9".repeat(50);
        let args = parse_arguments(&format!("10.0.0.1:9000,chan,{}", long_exten)).unwrap();
        assert_eq!(args.metadata.exten.len(), 31);
    }

    #[test]
    fn test_display_roundtrip() {
        let original = "10.0.0.5:9153,SIP/bob-2,2000";
        let parsed: ForkArgs = original.parse().unwrap();
        assert_eq!(parsed.to_string(), original);
        assert_eq!(parsed.to_string().parse::<ForkArgs>().unwrap(), parsed);
    }
}
