use super::{json_pretty, load_profile, overrides_from, CommandResult, PrinterArgs, EXIT_SUCCESS};
use slicebridge_core::Slicer;
use slicebridge_profile::to_command_words;

pub fn run(
    slicer: &Slicer,
    profile: Option<&str>,
    printer: &PrinterArgs,
    overrides: &[(String, String)],
    json: bool,
) -> CommandResult {
    let loaded = load_profile(slicer, profile)?
        .with_overrides(&overrides_from(slicer.table(), overrides));
    let args = slicer.engine_args(&loaded, printer.geometry(), printer.position);

    if json {
        println!("{}", json_pretty(&args)?);
    } else {
        let words: Vec<String> = to_command_words(&args)
            .into_iter()
            .map(|w| {
                if w.contains(char::is_whitespace) {
                    format!("{w:?}")
                } else {
                    w
                }
            })
            .collect();
        println!("{}", words.join(" "));
    }
    Ok(EXIT_SUCCESS)
}
