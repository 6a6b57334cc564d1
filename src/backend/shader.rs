// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Shaders are compiled ahead of time by
// build.rs and loaded from disk at startup.

use crate::error::{RendererError, RendererResult};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Read a SPIR-V file into properly aligned words.
///
/// Truncated files and files without the SPIR-V magic number are rejected
/// here rather than by the driver.
pub fn read_shader_code(path: &Path) -> RendererResult<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|e| RendererError::shader_load(path, e))?;

    // read_spv handles alignment and endianness, not the header
    let code = ash::util::read_spv(&mut Cursor::new(&bytes))
        .map_err(|e| RendererError::shader_load(path, format!("invalid SPIR-V: {}", e)))?;

    match code.first() {
        Some(&SPIRV_MAGIC) => Ok(code),
        Some(&word) => Err(RendererError::shader_load(
            path,
            format!("bad SPIR-V magic number {:#010x}", word),
        )),
        None => Err(RendererError::shader_load(path, "empty shader binary")),
    }
}

/// Load a compiled shader and create a shader module on `device`
pub fn load_shader_module(device: &ash::Device, path: &Path) -> RendererResult<vk::ShaderModule> {
    let code = read_shader_code(path)?;
    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    let module = unsafe { device.create_shader_module(&create_info, None) }
        .map_err(|e| RendererError::shader_load(path, format!("rejected by device: {:?}", e)))?;

    log::debug!("Loaded shader {:?} ({} words)", path, code.len());
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_shader_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.spv");

        match read_shader_code(&path) {
            Err(RendererError::ShaderLoad { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected ShaderLoad, got {:?}", other),
        }
    }

    #[test]
    fn truncated_binary_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x03, 0x02, 0x23]).unwrap();

        assert!(matches!(
            read_shader_code(file.path()),
            Err(RendererError::ShaderLoad { .. })
        ));
    }

    #[test]
    fn empty_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(read_shader_code(file.path()).is_err());
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&0xdead_beefu32.to_le_bytes()).unwrap();

        assert!(read_shader_code(file.path()).is_err());
    }

    #[test]
    fn valid_header_is_read_as_words() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for word in [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0] {
            file.write_all(&word.to_le_bytes()).unwrap();
        }

        let code = read_shader_code(file.path()).unwrap();
        assert_eq!(code.len(), 5);
        assert_eq!(code[0], SPIRV_MAGIC);
    }
}
