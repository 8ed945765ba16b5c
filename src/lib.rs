#![no_std]
#![deny(unsafe_code)]

/*! The _tcpsim_ library is a user-space TCP/IP stack for emulated networks.

It implements the TCP connection engine (sender, receiver, reassembly and the
connection state machine) together with the minimal IPv4 glue needed to run it
over a simulated link: Ethernet framing, ARP resolution and longest-prefix-match
routing. Nothing here touches an operating system network stack; frames are
exchanged as plain byte buffers and time only advances when the driver says so.

# Table of contents

The stack is split into layers, in the same way as most network stacks:

 * The [wire](wire/index.html) module deals with the packet *representation*:
   Ethernet, ARP, IPv4 and TCP headers, as well as TCP sequence number arithmetic.
 * The [storage](storage/index.html) module provides the bounded byte stream and
   the out-of-order stream reassembler used by both halves of a connection.
 * The [socket](socket/index.html) module holds the TCP protocol state machine.
 * The [iface](iface/index.html) module deals with *network interfaces* and routers:
   it resolves hardware addresses and forwards datagrams between interfaces.

All operations are synchronous and run to completion; there is no background
thread and no wall clock. The driver reports elapsed virtual time through the
various `tick` methods, which makes every run deterministic.
*/

extern crate alloc;

#[cfg(test)]
extern crate std;

#[macro_use]
mod macros;
mod parsers;
mod rand;

pub mod config;
pub mod iface;
pub mod phy;
pub mod socket;
pub mod storage;
pub mod time;
pub mod wire;
