use serde::{Deserialize, Serialize};

/// Imágenes que produce una corrida.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSlot {
    Skeleton,
    Region,
    Flatten,
}

impl ArtifactSlot {
    pub const ALL: [ArtifactSlot; 3] = [
        ArtifactSlot::Skeleton,
        ArtifactSlot::Region,
        ArtifactSlot::Flatten,
    ];

    /// Texto que el programa imprime al guardar la imagen.
    pub fn marker(self) -> &'static str {
        match self {
            ArtifactSlot::Skeleton => "./current_skeleton.png",
            ArtifactSlot::Region => "./current_region.png",
            ArtifactSlot::Flatten => "./current_flatten.png",
        }
    }

    pub fn default_file_name(self) -> &'static str {
        match self {
            ArtifactSlot::Skeleton => "current_skeleton.png",
            ArtifactSlot::Region => "current_region.png",
            ArtifactSlot::Flatten => "current_flatten.png",
        }
    }

    /// Primer slot cuyo marcador aparece en la línea.
    pub fn detect(line: &str) -> Option<ArtifactSlot> {
        Self::ALL.into_iter().find(|slot| line.contains(slot.marker()))
    }
}

/// Archivos de salida vistos en el log de una tarea.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputArtifacts {
    pub skeleton: Option<String>,
    pub region: Option<String>,
    pub flatten: Option<String>,
}

impl OutputArtifacts {
    pub fn get(&self, slot: ArtifactSlot) -> Option<&str> {
        match slot {
            ArtifactSlot::Skeleton => self.skeleton.as_deref(),
            ArtifactSlot::Region => self.region.as_deref(),
            ArtifactSlot::Flatten => self.flatten.as_deref(),
        }
    }

    pub fn set(&mut self, slot: ArtifactSlot, file_name: impl Into<String>) {
        let file_name = Some(file_name.into());
        match slot {
            ArtifactSlot::Skeleton => self.skeleton = file_name,
            ArtifactSlot::Region => self.region = file_name,
            ArtifactSlot::Flatten => self.flatten = file_name,
        }
    }

    /// Si el slot nunca apareció en el log se usa el nombre fijo.
    pub fn file_name_or_default(&self, slot: ArtifactSlot) -> &str {
        self.get(slot).unwrap_or(slot.default_file_name())
    }

    /// Registra el archivo si la línea anuncia uno. Devuelve el slot tocado.
    pub fn observe_line(&mut self, line: &str) -> Option<ArtifactSlot> {
        let slot = ArtifactSlot::detect(line)?;
        self.set(slot, slot.default_file_name());
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detecta_cada_imagen_en_su_slot() {
        let mut artifacts = OutputArtifacts::default();

        assert_eq!(
            artifacts.observe_line("saved ./current_skeleton.png"),
            Some(ArtifactSlot::Skeleton)
        );
        assert_eq!(
            artifacts.observe_line("./current_region.png"),
            Some(ArtifactSlot::Region)
        );
        assert_eq!(artifacts.observe_line("Loading weights"), None);

        assert_eq!(artifacts.skeleton.as_deref(), Some("current_skeleton.png"));
        assert_eq!(artifacts.region.as_deref(), Some("current_region.png"));
        assert_eq!(artifacts.flatten, None);
    }

    #[test]
    fn sin_marcador_usa_el_nombre_fijo() {
        let artifacts = OutputArtifacts::default();
        assert_eq!(
            artifacts.file_name_or_default(ArtifactSlot::Flatten),
            "current_flatten.png"
        );
    }

    #[test]
    fn linea_con_varios_marcadores_toma_el_primero() {
        let mut artifacts = OutputArtifacts::default();
        let slot = artifacts.observe_line("./current_flatten.png ./current_skeleton.png");
        assert_eq!(slot, Some(ArtifactSlot::Skeleton));
        assert_eq!(artifacts.flatten, None);
    }
}
