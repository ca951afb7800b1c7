//! Secret generation command handler

use crate::config::MIN_SECRET_LEN;
use crate::security::secret::random_hex;

pub fn cmd_gen_secret(bytes: usize) -> anyhow::Result<()> {
    // Hex doubles the length; half the minimum in bytes is enough.
    let min_bytes = MIN_SECRET_LEN.div_ceil(2);
    if bytes < min_bytes {
        anyhow::bail!("Refusing to generate a secret shorter than {min_bytes} bytes");
    }

    println!("{}", random_hex(bytes));
    Ok(())
}
