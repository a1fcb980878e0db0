use crate::app::command_support::{to_pretty_json, CliContext, FlagArgs};
use crate::onboarding::{AccessItemStatus, AccessItemUpdate, NewUser, UserEntity, UserStore};

const ONBOARD_USAGE: &str = "user onboard --name <name> --email <email> --team <team> \
[--role R] [--contact-no C] [--location L] [--date-of-joining D] [--level L] [--manager M]";
const UPDATE_USAGE: &str = "user update --email <email> --item <access_item> --status <pending|completed>";

pub fn cmd_user(context: &CliContext, args: &[String]) -> Result<String, String> {
    if args.is_empty() {
        return Err("usage: user <onboard|list|show|advance|update> ...".to_string());
    }

    match args[0].as_str() {
        "onboard" => {
            let user = parse_new_user(&args[1..])?;
            let service = context
                .runtime()?
                .onboarding_service()
                .map_err(|e| e.to_string())?;
            let entity = service.run_to_completion(&user).map_err(|e| e.to_string())?;
            to_pretty_json(&entity)
        }
        "list" => {
            if args.len() != 1 {
                return Err("usage: user list".to_string());
            }
            let store = open_store(context)?;
            let users = store.list_users().map_err(|e| e.to_string())?;
            Ok(users.iter().map(user_line).collect::<Vec<_>>().join("\n"))
        }
        "show" => {
            let email = email_flag(&args[1..], "user show --email <email>")?;
            let store = open_store(context)?;
            to_pretty_json(&find_user(&store, &email)?)
        }
        "advance" => {
            let email = email_flag(&args[1..], "user advance --email <email>")?;
            let service = context
                .runtime()?
                .onboarding_service()
                .map_err(|e| e.to_string())?;
            let user = find_user(service.flow().store(), &email)?;
            let outcome = service.flow().advance(user.id).map_err(|e| e.to_string())?;
            Ok(format!(
                "user_id={}\noutcome={outcome:?}\nstage={}",
                user.id,
                outcome.stage().as_str()
            ))
        }
        "update" => {
            let flags = FlagArgs::parse(&args[1..])?;
            flags.reject_unknown(&["email", "item", "status"])?;
            let email = flags.required("email", UPDATE_USAGE)?;
            let status_raw = flags.required("status", UPDATE_USAGE)?;
            let status = AccessItemStatus::parse(&status_raw)
                .ok_or_else(|| format!("invalid status `{status_raw}`\nusage: {UPDATE_USAGE}"))?;
            let items = flags.all("item");
            if items.is_empty() {
                return Err(format!("missing `--item`\nusage: {UPDATE_USAGE}"));
            }
            let updates: Vec<AccessItemUpdate> = items
                .iter()
                .map(|item| AccessItemUpdate {
                    service: item.trim().to_string(),
                    status,
                })
                .collect();

            let service = context
                .runtime()?
                .onboarding_service()
                .map_err(|e| e.to_string())?;
            let user = find_user(service.flow().store(), &email)?;
            let (changed, outcome) = service
                .flow()
                .update_access_items(user.id, &updates)
                .map_err(|e| e.to_string())?;
            Ok(format!(
                "user_id={}\nchanged={}\nstage={}",
                user.id,
                if changed.is_empty() {
                    "-".to_string()
                } else {
                    changed.join(",")
                },
                outcome.stage().as_str()
            ))
        }
        other => Err(format!("unknown user subcommand `{other}`")),
    }
}

pub fn parse_new_user(args: &[String]) -> Result<NewUser, String> {
    let flags = FlagArgs::parse(args)?;
    flags.reject_unknown(&[
        "name",
        "email",
        "team",
        "role",
        "contact-no",
        "location",
        "date-of-joining",
        "level",
        "manager",
    ])?;
    let user = NewUser {
        name: flags.required("name", ONBOARD_USAGE)?,
        email: flags.required("email", ONBOARD_USAGE)?,
        team: flags.required("team", ONBOARD_USAGE)?,
        role: flags.optional("role"),
        contact_no: flags.optional("contact-no"),
        location: flags.optional("location"),
        date_of_joining: flags.optional("date-of-joining"),
        level: flags.optional("level"),
        manager: flags.optional("manager"),
    };
    user.validate()?;
    Ok(user)
}

fn email_flag(args: &[String], usage: &str) -> Result<String, String> {
    let flags = FlagArgs::parse(args)?;
    flags.reject_unknown(&["email"])?;
    flags.required("email", usage)
}

fn open_store(context: &CliContext) -> Result<UserStore, String> {
    context.runtime()?.user_store().map_err(|e| e.to_string())
}

fn find_user(store: &UserStore, email: &str) -> Result<UserEntity, String> {
    store
        .find_user_by_email(email)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("no user with email `{email}`"))
}

fn user_line(user: &UserEntity) -> String {
    let pending = user.pending_items().count();
    format!(
        "id={} name={} email={} team={} stage={} pending_items={}",
        user.id,
        user.name,
        user.company_email.as_deref().unwrap_or(&user.email),
        user.team,
        user.stage.as_str(),
        pending
    )
}
