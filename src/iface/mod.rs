/*! Network interface logic.

The `iface` module deals with the *network interfaces*. It filters incoming frames,
provides lookup and caching of hardware addresses, and forwards datagrams between
interfaces according to a routing table.
*/

mod interface;
mod neighbor;
mod packet;
mod route;
mod router;

pub use self::interface::NetworkInterface;
pub use self::neighbor::Cache as NeighborCache;
pub use self::packet::Datagram;
pub use self::route::{Route, RouteTableFull, Routes};
pub use self::router::Router;
