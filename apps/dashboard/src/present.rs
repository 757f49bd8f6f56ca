use client_core::{EditForm, RecordView, SaveOutcome};

pub fn print_view(view: &RecordView) {
    let width = label_width(view.slots.iter().map(|slot| slot.label));
    for slot in &view.slots {
        println!("{:<width$}  {}", slot.label, slot.text);
    }
}

pub fn print_form(form: &EditForm) {
    println!("editing site {}", form.site_id);
    let width = label_width(form.inputs.iter().map(|input| input.field));
    for input in &form.inputs {
        let marker = if input.is_touched() { "*" } else { " " };
        match (input.value.is_empty(), input.placeholder) {
            (true, Some(placeholder)) => {
                println!("{marker} {:<width$}  [{placeholder}]", input.field)
            }
            _ => println!("{marker} {:<width$}  {}", input.field, input.value),
        }
    }
}

pub fn print_save_outcome(outcome: &SaveOutcome) {
    match outcome {
        SaveOutcome::Saved { message, view } => {
            println!("{message}");
            print_view(view);
        }
        SaveOutcome::SavedStale {
            message,
            refresh_error,
        } => {
            println!("{message}");
            println!("could not reload the site: {refresh_error}");
        }
        SaveOutcome::Ignored => println!("a save is already in progress"),
    }
}

fn label_width<'a>(labels: impl Iterator<Item = &'a str>) -> usize {
    labels.map(str::len).max().unwrap_or(0)
}
