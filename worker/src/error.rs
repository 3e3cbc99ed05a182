use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("no se pudo lanzar {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("error de E/S: {0}")]
    Io(#[from] io::Error),
    #[error("el proceso terminó con código {code}")]
    NonZeroExit { code: i32 },
    #[error("el proceso terminó por una señal")]
    Killed,
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("el worker ya no acepta tareas")]
    Closed,
}
