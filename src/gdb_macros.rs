//! The checkpoint command channel and the gdb-side macros that drive it.
//!
//! The gdb remote protocol has no verb for "create/delete a replay
//! checkpoint", so checkpoint operations are encoded as 32-bit writes to a
//! fixed, protocol-reserved address. The debug server intercepts writes to
//! that address before they reach the replayed program and treats the top
//! byte as an opcode tag. Both sides of that compatibility surface are
//! defined here, and the macro text delivered to the gdb client at launch is
//! generated from the same constants.

use std::fmt::Write;

/// Not a real tracee address. Writes here are consumed by the debug server.
pub const CHECKPOINT_COMMAND_ADDR: usize = 29298;

pub const CMD_CREATE_CHECKPOINT: u32 = 0x0100_0000;
pub const CMD_DELETE_CHECKPOINT: u32 = 0x0200_0000;
/// The low bits carry the checkpoint index/argument.
pub const CMD_ARG_MASK: u32 = 0x00ff_ffff;

const_assert_eq!(CMD_CREATE_CHECKPOINT & CMD_ARG_MASK, 0);
const_assert_eq!(CMD_DELETE_CHECKPOINT & CMD_ARG_MASK, 0);

/// A checkpoint operation travelling over the reserved-address side channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CheckpointCommand {
    CreateCheckpoint(u32),
    DeleteCheckpoint(u32),
}

impl CheckpointCommand {
    /// The 32-bit value the gdb macro writes to the reserved address.
    pub fn encode(&self) -> u32 {
        match *self {
            CheckpointCommand::CreateCheckpoint(index) => {
                CMD_CREATE_CHECKPOINT | (index & CMD_ARG_MASK)
            }
            CheckpointCommand::DeleteCheckpoint(index) => {
                CMD_DELETE_CHECKPOINT | (index & CMD_ARG_MASK)
            }
        }
    }

    /// What the server side makes of an intercepted write. `None` for a
    /// value carrying no recognized opcode tag.
    pub fn decode(raw: u32) -> Option<CheckpointCommand> {
        match raw & !CMD_ARG_MASK {
            CMD_CREATE_CHECKPOINT => Some(CheckpointCommand::CreateCheckpoint(raw & CMD_ARG_MASK)),
            CMD_DELETE_CHECKPOINT => Some(CheckpointCommand::DeleteCheckpoint(raw & CMD_ARG_MASK)),
            _ => None,
        }
    }

    /// The value the macro echoes back to the user: the checkpoint's
    /// identifier, not the encoded message.
    pub fn echo(&self) -> u32 {
        match *self {
            CheckpointCommand::CreateCheckpoint(index)
            | CheckpointCommand::DeleteCheckpoint(index) => index,
        }
    }
}

/// Client-local checkpoint numbering, the counterpart of the
/// `$_next_checkpoint_index` convenience variable the `checkpoint` macro
/// keeps in gdb. Seeded at 1 on first use.
#[derive(Debug)]
pub struct CheckpointCounter {
    next_index: u32,
}

impl CheckpointCounter {
    pub fn new() -> CheckpointCounter {
        CheckpointCounter { next_index: 1 }
    }

    pub fn next_create(&mut self) -> CheckpointCommand {
        let cmd = CheckpointCommand::CreateCheckpoint(self.next_index);
        self.next_index += 1;
        cmd
    }
}

impl Default for CheckpointCounter {
    fn default() -> CheckpointCounter {
        CheckpointCounter::new()
    }
}

lazy_static! {
    static ref GDB_RDB_MACROS: String = gdb_rdb_macros_init();
}

/// The macro text delivered verbatim to the gdb client at launch.
pub fn gdb_rdb_macros() -> &'static str {
    &*GDB_RDB_MACROS
}

/// Special-sauce macros defined by rdb when launching the gdb client,
/// which implement functionality outside of the gdb remote protocol.
/// (Don't stare at them too long or you'll go blind ;).)
fn gdb_rdb_macros_init() -> String {
    let mut ss = String::new();
    write!(
        ss,
        "define checkpoint\n\
         \x20 init-if-undefined $_next_checkpoint_index = 1\n\
         \x20 p (*(int*){addr} = {create:#010x} | $_next_checkpoint_index), \
         $_next_checkpoint_index++\n\
         end\n\
         document checkpoint\n\
         create a checkpoint at the current replay position\n\
         end\n\
         define delete checkpoint\n\
         \x20 p (*(int*){addr} = {delete:#010x} | $arg0), $arg0\n\
         end\n\
         define restart\n\
         \x20 if $argc == 1\n\
         \x20   run c$arg0\n\
         \x20 else\n\
         \x20   run c\n\
         \x20 end\n\
         end\n\
         document restart\n\
         restart at checkpoint N, or from the beginning of the trace with no \
         argument\n\
         checkpoints are created with the 'checkpoint' command\n\
         end\n",
        addr = CHECKPOINT_COMMAND_ADDR,
        create = CMD_CREATE_CHECKPOINT,
        delete = CMD_DELETE_CHECKPOINT,
    )
    .unwrap();
    // Some platforms suppress SIGURG by default; a recorded SIGURG should be
    // visible to the user instead of silently passed through.
    ss.push_str("handle SIGURG stop\n");
    ss
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_create_sequence_test() {
        let mut counter = CheckpointCounter::new();
        let expected = [(0x0100_0001, 1), (0x0100_0002, 2), (0x0100_0003, 3)];
        for &(encoded, echoed) in &expected {
            let cmd = counter.next_create();
            assert_eq!(cmd.encode(), encoded);
            assert_eq!(cmd.echo(), echoed);
        }
    }

    #[test]
    fn checkpoint_delete_test() {
        let cmd = CheckpointCommand::DeleteCheckpoint(2);
        assert_eq!(cmd.encode(), 0x0200_0002);
        assert_eq!(cmd.echo(), 2);
    }

    #[test]
    fn decode_test() {
        assert_eq!(
            CheckpointCommand::decode(0x0100_0007),
            Some(CheckpointCommand::CreateCheckpoint(7))
        );
        assert_eq!(
            CheckpointCommand::decode(0x0200_0002),
            Some(CheckpointCommand::DeleteCheckpoint(2))
        );
        assert_eq!(CheckpointCommand::decode(0x0300_0001), None);
        assert_eq!(CheckpointCommand::decode(42), None);
    }

    #[test]
    fn macro_text_test() {
        let text = gdb_rdb_macros();
        assert!(text.contains("define checkpoint"));
        assert!(text.contains("init-if-undefined $_next_checkpoint_index = 1"));
        assert!(text.contains("p (*(int*)29298 = 0x01000000 | $_next_checkpoint_index)"));
        assert!(text.contains("define delete checkpoint"));
        assert!(text.contains("p (*(int*)29298 = 0x02000000 | $arg0), $arg0"));
        assert!(text.contains("define restart"));
        assert!(text.contains("run c$arg0"));
        assert!(text.contains("handle SIGURG stop"));
    }
}
