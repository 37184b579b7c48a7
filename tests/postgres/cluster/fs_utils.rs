//! Reads the files an embedded cluster writes at startup.

use super::BoxError;
use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use postgresql_embedded::Settings;
use std::io::ErrorKind;

fn open_dir(path: &Utf8Path) -> Result<Dir, BoxError> {
    Dir::open_ambient_dir(path, ambient_authority()).map_err(|err| Box::new(err) as BoxError)
}

/// Reads `path`, treating a missing file as `None`.
fn read_optional(path: &Utf8Path) -> Result<Option<String>, BoxError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Box::new(std::io::Error::other("path has no file name")) as BoxError)?;
    let dir = open_dir(path.parent().unwrap_or_else(|| Utf8Path::new(".")))?;
    match dir.read_to_string(file_name) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(Box::new(err) as BoxError),
    }
}

/// Picks up the generated superuser password, if one was written.
pub(super) fn sync_password_from_file(settings: &mut Settings) -> Result<(), BoxError> {
    let path = settings.password_file.to_string_lossy().into_owned();
    if let Some(contents) = read_optional(Utf8Path::new(&path))? {
        let password = contents.trim_end();
        if !password.is_empty() {
            password.clone_into(&mut settings.password);
        }
    }
    Ok(())
}

/// Uses the port recorded on line four of `postmaster.pid`.
pub(super) fn sync_port_from_pid(settings: &mut Settings) -> Result<(), BoxError> {
    let data_dir = settings.data_dir.to_string_lossy().into_owned();
    let pid_file = Utf8Path::new(&data_dir).join("postmaster.pid");
    let Some(contents) = read_optional(&pid_file)? else {
        return Ok(());
    };
    if let Some(port) = contents
        .lines()
        .nth(3)
        .and_then(|line| line.trim().parse::<u16>().ok())
    {
        settings.port = port;
    }
    Ok(())
}
