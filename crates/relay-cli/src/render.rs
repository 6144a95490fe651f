use anyhow::{anyhow, Result};
use bat::WrappingMode;
use console::style;
use relay::models::event::{Event, EventKind, META_AGENT, META_EVENT_TYPE};
use serde_json::Value;

fn print_markdown(content: &str) -> Result<()> {
    bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print()
        .map(|_| ())
        .map_err(|err| anyhow!("Failed to render output: {}", err))
}

fn print_tool_call(content: &str, agent: &str) -> Result<()> {
    // Tool calls arrive as compact JSON
    let pretty = serde_json::from_str::<Value>(content)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| content.to_string());

    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(pretty.as_bytes()).name(format!("Tool Call: {}", agent)))
        .language("JSON")
        .grid(true)
        .header(true)
        .wrapping_mode(WrappingMode::Character)
        .print();
    printed
        .map(|_| ())
        .map_err(|err| anyhow!("Failed to render tool call: {}", err))
}

pub fn event(event: &Event) -> Result<()> {
    let agent = event.metadata_str(META_AGENT).unwrap_or("agent");
    match event.kind() {
        EventKind::AgentResponse => {
            println!("{}", style(agent).cyan().bold());
            print_markdown(event.content())?;
            println!();
        }
        EventKind::ToolCall => print_tool_call(event.content(), agent)?,
        EventKind::Thinking => println!("{}", style(event.content()).dim().italic()),
        EventKind::Message => {
            let kind = event.metadata_str(META_EVENT_TYPE).unwrap_or("message");
            println!("{} {}", style(format!("[{}]", kind)).dim(), event.content());
        }
        // The prompt is shown by the input itself
        EventKind::InputRequest => {}
        EventKind::Error => eprintln!("{} {}", style("error:").red().bold(), event.content()),
        EventKind::Completed => println!("{}", style(event.content()).green()),
    }
    Ok(())
}
