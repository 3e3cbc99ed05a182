use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use common::{ProgressState, RunRequest, TaskInfo, TaskResults, UploadResponse};
use reqwest::{multipart, Client, Response};
use std::{
    env,
    path::{Path, PathBuf},
};

use crate::sse::SseParser;

/// - Default http://localhost:5000 (puerto del servidor)
/// - SEG_SERVER_URL para apuntar a otro host
fn server_base_url() -> String {
    env::var("SEG_SERVER_URL").unwrap_or_else(|_| "http://localhost:5000".to_string())
}

#[derive(Parser)]
#[command(name = "seg-client")]
#[command(about = "CLI para subir imágenes y seguir segmentaciones")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sube una imagen al servidor
    Upload {
        #[arg(value_name = "IMAGEN")]
        path: PathBuf,
    },
    /// Lanza la segmentación de una imagen ya subida
    Run {
        #[arg(value_name = "ARCHIVO")]
        filename: String,

        /// No seguir el progreso, sólo encolar
        #[arg(long)]
        no_follow: bool,
    },
    /// Sigue el progreso de una tarea hasta que termine
    Watch {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Consulta el estado de una tarea
    Status {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Lista las imágenes de salida de una tarea
    Results {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Descarga las imágenes de salida
    Download {
        #[arg(value_name = "TASK_ID")]
        id: String,

        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Todo junto: sube, segmenta, sigue el progreso y descarga
    Segment {
        #[arg(value_name = "IMAGEN")]
        path: PathBuf,

        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let api = Api {
        client: Client::new(),
        base_url: server_base_url(),
    };

    match cli.command {
        Commands::Upload { path } => {
            let uploaded = api.upload(&path).await?;
            println!("Archivo subido: {}", uploaded.filename);
        }

        Commands::Run {
            filename,
            no_follow,
        } => {
            let info = api.create_task(&filename).await?;
            print_task(&info);
            if !no_follow {
                api.watch(&info.id).await?;
            }
        }

        Commands::Watch { id } => api.watch(&id).await?,

        Commands::Status { id } => {
            let info = api.task(&id).await?;
            print_task(&info);
        }

        Commands::Results { id } => {
            let results = api.results(&id).await?;
            println!("Resultados para tarea {} ({:?}):", results.task_id, results.status);
            for a in &results.artifacts {
                println!("  {:?}: {} -> {}{}", a.slot, a.filename, api.base_url, a.url);
            }
        }

        Commands::Download { id, dir } => api.download(&id, &dir).await?,

        Commands::Segment { path, dir } => {
            let uploaded = api.upload(&path).await?;
            println!("Archivo subido: {}", uploaded.filename);
            let info = api.create_task(&uploaded.filename).await?;
            println!("Tarea {} encolada", info.id);
            api.watch(&info.id).await?;
            api.download(&info.id, &dir).await?;
        }
    }

    Ok(())
}

fn print_task(info: &TaskInfo) {
    println!("Tarea:");
    println!("  id: {}", info.id);
    println!("  estado: {:?}", info.status);
    println!("  archivo: {}", info.input_file);
    println!("  progreso: {}/{}", info.current, info.total);
    println!("  enviada: {}", info.submitted_at);
    if let Some(ref started) = info.started_at {
        println!("  iniciada: {}", started);
    }
    if let Some(ref finished) = info.finished_at {
        println!("  finalizada: {}", finished);
    }
    if let Some(ref error) = info.error {
        println!("  error: {}", error);
    }
}

/// Si la respuesta no es 2xx, corta con el mensaje de error del servidor.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let msg = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
        .unwrap_or(body);
    bail!("el servidor respondió {}: {}", status, msg)
}

struct Api {
    client: Client,
    base_url: String,
}

impl Api {
    async fn upload(&self, path: &Path) -> Result<UploadResponse> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("no se pudo leer {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .context("la ruta no tiene nombre de archivo")?;

        let part = multipart::Part::bytes(data).file_name(name);
        let form = multipart::Form::new().part("file", part);
        let url = format!("{}/api/v1/uploads", self.base_url);
        let resp = self.client.post(&url).multipart(form).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn create_task(&self, filename: &str) -> Result<TaskInfo> {
        let url = format!("{}/api/v1/tasks", self.base_url);
        let req = RunRequest {
            filename: filename.to_string(),
        };
        let resp = self.client.post(&url).json(&req).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn task(&self, id: &str) -> Result<TaskInfo> {
        let url = format!("{}/api/v1/tasks/{id}", self.base_url);
        let resp = self.client.get(&url).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn results(&self, id: &str) -> Result<TaskResults> {
        let url = format!("{}/api/v1/tasks/{id}/results", self.base_url);
        let resp = self.client.get(&url).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Imprime cada `paso c/t` del stream hasta que la tarea termina.
    async fn watch(&self, id: &str) -> Result<()> {
        let url = format!("{}/api/v1/tasks/{id}/progress", self.base_url);
        let mut resp = check(self.client.get(&url).send().await?).await?;
        let mut parser = SseParser::new();
        let mut last: Option<ProgressState> = None;

        while let Some(chunk) = resp.chunk().await? {
            for event in parser.push(&chunk) {
                match event.event.as_str() {
                    "unknown" => bail!("tarea desconocida: {id}"),
                    "failed" => {
                        let (progress, reason) =
                            event.data.split_once('\n').unwrap_or((event.data.as_str(), ""));
                        bail!("la tarea {id} falló en el paso {progress}: {reason}");
                    }
                    _ => {
                        let progress: ProgressState = event
                            .data
                            .parse()
                            .map_err(|e: String| anyhow::anyhow!(e))?;
                        if last != Some(progress) {
                            println!("paso {}", progress);
                            last = Some(progress);
                        }
                    }
                }
            }
        }

        match last {
            Some(p) if p.is_done() => {
                println!("Tarea {id} completada");
                Ok(())
            }
            _ => bail!("el stream de progreso se cortó antes de terminar"),
        }
    }

    async fn download(&self, id: &str, dir: &Path) -> Result<()> {
        let results = self.results(id).await?;
        tokio::fs::create_dir_all(dir).await?;

        for a in &results.artifacts {
            let url = format!("{}{}", self.base_url, a.url);
            let resp = check(self.client.get(&url).send().await?).await?;
            let bytes = resp.bytes().await?;
            let target = dir.join(&a.filename);
            tokio::fs::write(&target, &bytes)
                .await
                .with_context(|| format!("no se pudo escribir {}", target.display()))?;
            println!("  {:?} -> {}", a.slot, target.display());
        }
        Ok(())
    }
}
