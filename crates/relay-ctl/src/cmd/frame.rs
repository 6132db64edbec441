//! Frame inspection.

use anyhow::Result;
use relay_core::wire::{self, HEADER_LEN};
use relay_core::{ChatRequest, ChatTurn};

/// Print the envelope a single user message would be sent as.
pub fn cmd_frame(model: &str, text: &str) -> Result<()> {
    let request = ChatRequest::new(model, vec![ChatTurn::user(text)]);
    let frame = wire::frame_request(&request)?;
    let bytes = frame.encode();

    println!("═══════════════════════════════════════");
    println!("  StreamChat Frame");
    println!("═══════════════════════════════════════");
    println!("  Flags   : 0x{:02x}", frame.magic());
    println!("  Length  : {} bytes", frame.length());
    println!("  Header  : {}", hex::encode(&bytes[..HEADER_LEN]));
    println!("  Payload : {}", hex::encode(&bytes[HEADER_LEN..]));
    Ok(())
}
