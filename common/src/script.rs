/// Mensajes que el programa de segmentación imprime durante una corrida,
/// en el orden en que aparecen. La longitud de esta lista es el total de
/// pasos de cualquier tarea.
///
/// Los mensajes repetidos (go_flipped_vector, get_fill) son intencionales:
/// el tracker sólo hace match con la primera aparición y usa el contador de
/// ocurrencias para avanzar.
pub const EXPECTED_MESSAGES: [&str; 25] = [
    "begin load",
    "Loading weights",
    "Loading image...",
    "Image loaded, starting processing...",
    "Starting segmentation...",
    "Starting go_transposed_vector...",
    "Starting go_flipped_vector...",
    "Completed go_flipped_vector.",
    "Starting go_flipped_vector...",
    "Completed go_flipped_vector.",
    "Completed go_transposed_vector.",
    "Starting get_fill...",
    "Completed get_fill.",
    "Starting get_fill...",
    "Completed get_fill.",
    "Starting get_fill...",
    "Completed get_fill.",
    "Starting up_fill...",
    "Completed up_fill.",
    "Segmentation completed",
    "Saving output images...",
    "./current_skeleton.png",
    "./current_region.png",
    "./current_flatten.png",
    "Processing complete!",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_empieza_en_begin_load_y_termina_en_processing_complete() {
        assert_eq!(EXPECTED_MESSAGES[0], "begin load");
        assert_eq!(EXPECTED_MESSAGES[EXPECTED_MESSAGES.len() - 1], "Processing complete!");
        assert_eq!(EXPECTED_MESSAGES.len(), 25);
    }

    #[test]
    fn script_repite_get_fill_tres_veces() {
        let starts = EXPECTED_MESSAGES
            .iter()
            .filter(|m| **m == "Starting get_fill...")
            .count();
        let completes = EXPECTED_MESSAGES
            .iter()
            .filter(|m| **m == "Completed get_fill.")
            .count();
        assert_eq!((starts, completes), (3, 3));
    }
}
