/*!

Emulators and protocol bridges that let vintage HP instruments and
computers interoperate with a modern emulator (MAME) over text-based wire
protocols.

The protocol plane is organized in three families:

* The **remotizer** link layer ([`remotizer`], [`mux`]) carries IEEE-488
  bus semantics over TCP as short ASCII lines: command vs data bytes, EOI,
  parallel poll, service request and checkpoints.
* **Byte/bit synchronous framing**: the BiSync 2780 line discipline
  ([`bisync`]) and SDLC/HDLC frames with bit stuffing and CRC-16
  ([`sdlc`]), the latter carrying the SRM file server ([`srm`]).
* **Device state machines** consuming link events: Amigo and SS/80 disk
  drives ([`drive`]), the HP9872 plotter with its HPGL front end
  ([`hpgl`], [`plotter`]) and the HP9111 digitizer ([`digitizer`]).

[`ipcfs`] reads HP IPC filesystem images, treating a disk as an opaque
sector stream.
*/

pub mod bisync;
pub mod digitizer;
pub mod drive;
pub mod hpgl;
pub mod ipcfs;
pub mod mux;
pub mod plotter;
pub mod remotizer;
pub mod sdlc;
pub mod srm;
