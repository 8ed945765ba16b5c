//! Text forms of the addresses used to configure hosts and routes.
//!
//! Parsing is strict: no surrounding whitespace, no signs, and every field
//! bounded in both digit count and value.

use core::str::FromStr;

use crate::wire::{EthernetAddress, IpEndpoint, Ipv4Address, Ipv4Cidr};

/// Parse `text` as an unsigned number of at most `max_digits` digits whose
/// value is below `limit`.
fn number(text: &str, radix: u32, max_digits: usize, limit: u32) -> Result<u32, ()> {
    if text.is_empty() || text.len() > max_digits {
        return Err(());
    }
    let value = text.chars().try_fold(0u32, |acc, c| {
        c.to_digit(radix).map(|digit| acc * radix + digit).ok_or(())
    })?;
    if value < limit { Ok(value) } else { Err(()) }
}

fn ipv4(text: &str) -> Result<Ipv4Address, ()> {
    let mut octets = [0u8; 4];
    let mut parts = text.split('.');
    for octet in octets.iter_mut() {
        *octet = number(parts.next().ok_or(())?, 10, 3, 0x100)? as u8;
    }
    match parts.next() {
        None => Ok(Ipv4Address::from(octets)),
        Some(_) => Err(()),
    }
}

impl FromStr for EthernetAddress {
    type Err = ();

    /// Parse six hexadecimal octets separated by either `:` or `-`, used
    /// consistently.
    fn from_str(s: &str) -> Result<EthernetAddress, ()> {
        let separator = if s.contains('-') { '-' } else { ':' };
        let mut octets = [0u8; 6];
        let mut parts = s.split(separator);
        for octet in octets.iter_mut() {
            *octet = number(parts.next().ok_or(())?, 16, 2, 0x100)? as u8;
        }
        match parts.next() {
            None => Ok(EthernetAddress(octets)),
            Some(_) => Err(()),
        }
    }
}

impl FromStr for Ipv4Cidr {
    type Err = ();

    /// Parse `a.b.c.d/len`.
    fn from_str(s: &str) -> Result<Ipv4Cidr, ()> {
        let (addr, prefix_len) = s.split_once('/').ok_or(())?;
        let prefix_len = number(prefix_len, 10, 2, 33)? as u8;
        Ok(Ipv4Cidr::new(ipv4(addr)?, prefix_len))
    }
}

impl FromStr for IpEndpoint {
    type Err = ();

    /// Parse `a.b.c.d:port`. A missing port parses as port zero.
    fn from_str(s: &str) -> Result<IpEndpoint, ()> {
        let (addr, port) = match s.split_once(':') {
            Some((addr, port)) => (addr, number(port, 10, 5, 0x10000)? as u16),
            None => (s, 0),
        };
        Ok(IpEndpoint::new(ipv4(addr)?, port))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn mac(s: &str) -> Result<EthernetAddress, ()> {
        s.parse()
    }

    #[test]
    fn test_mac() {
        let router = Ok(EthernetAddress([0x02, 0x00, 0x5e, 0x00, 0x01, 0xfe]));
        assert_eq!(mac("02:00:5e:00:01:fe"), router);
        assert_eq!(mac("02-00-5E-00-01-FE"), router);
        assert_eq!(mac("2:0:5e:0:1:fe"), router);

        for bad in [
            "",
            "02:00:5e:00:01",
            "02:00:5e:00:01:fe:00",
            "02:00:5e:00:01:1fe",
            "02:00:5e:00:01:fg",
            "02:00-5e:00:01:fe",
            "02:00:5e::01:fe",
            "+2:00:5e:00:01:fe",
        ] {
            assert_eq!(mac(bad), Err(()), "{bad}");
        }
    }

    #[test]
    fn test_cidr() {
        assert_eq!(
            "192.168.0.0/24".parse(),
            Ok(Ipv4Cidr::new(Ipv4Address::new(192, 168, 0, 0), 24))
        );
        assert_eq!(
            "0.0.0.0/0".parse(),
            Ok(Ipv4Cidr::new(Ipv4Address::UNSPECIFIED, 0))
        );
        assert_eq!(
            "10.1.2.3/32".parse(),
            Ok(Ipv4Cidr::new(Ipv4Address::new(10, 1, 2, 3), 32))
        );

        for bad in [
            "",
            "10.0.0.0",
            "10.0.0.0/",
            "10.0.0.0/33",
            "10.0.0.0/008",
            "10.0.0/8",
            "10.0.0.0.0/8",
            "10.0.0.256/8",
            "10.0.0.0/8/8",
        ] {
            assert_eq!(bad.parse::<Ipv4Cidr>(), Err(()), "{bad}");
        }
    }

    #[test]
    fn test_endpoint() {
        let server = Ipv4Address::new(192, 168, 0, 2);
        assert_eq!("192.168.0.2:80".parse(), Ok(IpEndpoint::new(server, 80)));
        assert_eq!("192.168.0.2".parse(), Ok(IpEndpoint::new(server, 0)));
        assert_eq!(
            "192.168.0.2:65535".parse(),
            Ok(IpEndpoint::new(server, 65535))
        );

        for bad in [
            "",
            "server:80",
            "192.168.0.2:",
            "192.168.0.2:65536",
            "192.168.0.2:80:80",
            "[::1]:80",
        ] {
            assert_eq!(bad.parse::<IpEndpoint>(), Err(()), "{bad}");
        }
    }
}
