/*! Communication between endpoints.

The `socket` module deals with *network endpoints* and *buffering*.
It provides the TCP protocol state machine, which fills and empties a pair of
byte streams, and an adapter that carries its segments inside IPv4 datagrams.

The programming interface implemented here differs greatly from the common Berkeley socket
interface. Nothing happens behind the caller's back: a connection only acts when
a segment is handed to it, when the application writes to it, or when the driver
reports that time has passed. Segments it wants to send are queued, and the
driver decides when and where they go.
*/

pub mod tcp;
