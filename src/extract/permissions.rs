//! Permisos, propietario y grupo en sistemas Unix.

#![cfg(unix)]

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use users::{get_group_by_gid, get_user_by_uid};

pub fn owner_name(metadata: &Metadata) -> Option<String> {
    get_user_by_uid(metadata.uid()).map(|user| user.name().to_string_lossy().into_owned())
}

pub fn group_name(metadata: &Metadata) -> Option<String> {
    get_group_by_gid(metadata.gid()).map(|group| group.name().to_string_lossy().into_owned())
}

/// Notación `rwxr-x---` de los nueve bits de permiso.
pub fn format_unix_permissions(mode: u32) -> String {
    const TRIADS: [&str; 8] = ["---", "--x", "-w-", "-wx", "r--", "r-x", "rw-", "rwx"];

    [6, 3, 0]
        .iter()
        .map(|shift| TRIADS[((mode >> shift) & 0o7) as usize])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_symbolic_mode() {
        assert_eq!(format_unix_permissions(0o100644), "rw-r--r--");
        assert_eq!(format_unix_permissions(0o755), "rwxr-xr-x");
        assert_eq!(format_unix_permissions(0o640), "rw-r-----");
    }
}
